use serde::Serialize;
use thiserror::Error;

use crate::models::catalog::{find_flavor, find_image, Flavor, Image};
use crate::models::session::Role;
use crate::models::toast::Severity;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Locally detected form problems. These block dispatch before any request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Champ requis manquant : {0}")]
    MissingField(&'static str),
    #[error("Flavor inconnue : {0}")]
    UnknownFlavor(String),
    #[error("Ressources invalides : vCPU, RAM et disque doivent être positifs")]
    InvalidResources,
    #[error("Ressources personnalisées réservées aux administrateurs")]
    CustomSizingRequiresAdmin,
    #[error("Image {0} non téléchargée. Contactez l'administrateur")]
    ImageNotDownloaded(String),
    #[error("Mot de passe trop court (min {MIN_PASSWORD_LEN} caractères)")]
    PasswordTooShort,
    #[error("Accès réservé aux administrateurs")]
    AdminOnly,
}

impl ValidationError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::ImageNotDownloaded(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DeploySizing {
    Flavor(String),
    /// Explicit resources, admin only.
    Custom {
        vcpu: u32,
        ram_mb: u64,
        disk_gb: u64,
        host: Option<String>,
    },
}

/// Raw contents of the deploy dialog.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeployForm {
    pub name: String,
    pub sizing: Option<DeploySizing>,
    pub image: String,
    pub user: String,
    pub password: String,
    pub ssh_key: Option<String>,
}

/// Catalog data the deploy form is checked against.
pub struct DeployContext<'a> {
    pub role: Role,
    pub flavors: &'a [Flavor],
    pub images: &'a [Image],
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SizingPayload {
    Flavor {
        flavor: String,
    },
    Custom {
        cpu: u32,
        ram: u64,
        disk: u64,
        host: String,
    },
}

/// Body of `POST /vms`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeployRequest {
    pub name: String,
    #[serde(flatten)]
    pub sizing: SizingPayload,
    pub image: String,
    pub user: String,
    pub password: String,
    pub sshkey: String,
}

fn required(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(trimmed.to_string())
}

impl DeployForm {
    pub fn validate(&self, ctx: &DeployContext<'_>) -> Result<DeployRequest, ValidationError> {
        let name = required(&self.name, "nom")?;
        let sizing = match &self.sizing {
            None => return Err(ValidationError::MissingField("flavor")),
            Some(DeploySizing::Flavor(id)) => {
                let id = required(id, "flavor")?;
                if !ctx.flavors.is_empty() && find_flavor(ctx.flavors, &id).is_none() {
                    return Err(ValidationError::UnknownFlavor(id));
                }
                SizingPayload::Flavor { flavor: id }
            }
            Some(DeploySizing::Custom {
                vcpu,
                ram_mb,
                disk_gb,
                host,
            }) => {
                if !ctx.role.is_admin() {
                    return Err(ValidationError::CustomSizingRequiresAdmin);
                }
                if *vcpu == 0 || *ram_mb == 0 || *disk_gb == 0 {
                    return Err(ValidationError::InvalidResources);
                }
                SizingPayload::Custom {
                    cpu: *vcpu,
                    ram: *ram_mb,
                    disk: *disk_gb,
                    host: host
                        .as_deref()
                        .map(str::trim)
                        .filter(|h| !h.is_empty())
                        .unwrap_or("local")
                        .to_string(),
                }
            }
        };
        let image = required(&self.image, "image")?;
        if !ctx.role.is_admin() {
            if let Some(known) = find_image(ctx.images, &image) {
                if !known.downloaded {
                    return Err(ValidationError::ImageNotDownloaded(image));
                }
            }
        }
        let user = required(&self.user, "utilisateur")?;
        if self.password.is_empty() {
            return Err(ValidationError::MissingField("mot de passe"));
        }

        Ok(DeployRequest {
            name,
            sizing,
            image,
            user,
            password: self.password.clone(),
            sshkey: self.ssh_key.clone().unwrap_or_default(),
        })
    }
}

/// Body of `POST /admin/users`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NewUserForm {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub password: String,
}

impl NewUserForm {
    pub fn validate(&self) -> Result<NewUserForm, ValidationError> {
        let username = required(&self.username, "nom d'utilisateur")?;
        validate_password(&self.password)?;
        Ok(NewUserForm {
            username,
            email: self
                .email
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
            password: self.password.clone(),
        })
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flavors() -> Vec<Flavor> {
        vec![Flavor {
            id: "M".into(),
            name: "Medium".into(),
            vcpu: 2,
            ram_mb: 4096,
            disk_gb: 20,
            price_month: 3500.0,
        }]
    }

    fn images() -> Vec<Image> {
        vec![
            Image {
                name: "ubuntu-22.04".into(),
                size_mb: 640.0,
                downloaded: true,
            },
            Image {
                name: "debian-12".into(),
                size_mb: 0.0,
                downloaded: false,
            },
        ]
    }

    fn web1() -> DeployForm {
        DeployForm {
            name: "web1".into(),
            sizing: Some(DeploySizing::Flavor("M".into())),
            image: "ubuntu-22.04".into(),
            user: "ubuntu".into(),
            password: "s3cret!".into(),
            ssh_key: None,
        }
    }

    #[test]
    fn flavor_deploy_serializes_flat() {
        let flavors = flavors();
        let images = images();
        let ctx = DeployContext {
            role: Role::User,
            flavors: &flavors,
            images: &images,
        };
        let request = web1().validate(&ctx).unwrap();
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["flavor"], "M");
        assert_eq!(body["name"], "web1");
        assert_eq!(body["sshkey"], "");
        assert!(body.get("cpu").is_none());
    }

    #[test]
    fn missing_sizing_is_rejected() {
        let ctx = DeployContext {
            role: Role::User,
            flavors: &[],
            images: &[],
        };
        let mut form = web1();
        form.sizing = None;
        assert_eq!(
            form.validate(&ctx),
            Err(ValidationError::MissingField("flavor"))
        );
    }

    #[test]
    fn tenant_cannot_pick_undownloaded_image() {
        let flavors = flavors();
        let images = images();
        let ctx = DeployContext {
            role: Role::User,
            flavors: &flavors,
            images: &images,
        };
        let mut form = web1();
        form.image = "debian-12".into();
        let err = form.validate(&ctx).unwrap_err();
        assert_eq!(err, ValidationError::ImageNotDownloaded("debian-12".into()));
        assert_eq!(err.severity(), Severity::Warning);
    }

    #[test]
    fn admin_custom_sizing_defaults_host() {
        let images = images();
        let ctx = DeployContext {
            role: Role::Admin,
            flavors: &[],
            images: &images,
        };
        let mut form = web1();
        form.image = "debian-12".into();
        form.sizing = Some(DeploySizing::Custom {
            vcpu: 4,
            ram_mb: 8192,
            disk_gb: 40,
            host: None,
        });
        let body = serde_json::to_value(form.validate(&ctx).unwrap()).unwrap();
        assert_eq!(body["cpu"], 4);
        assert_eq!(body["ram"], 8192);
        assert_eq!(body["host"], "local");
    }

    #[test]
    fn short_password_rejected() {
        assert_eq!(
            validate_password("abc"),
            Err(ValidationError::PasswordTooShort)
        );
        assert!(validate_password("abcdef").is_ok());
    }
}
