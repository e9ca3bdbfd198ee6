use serde::{Deserialize, Serialize};

/// Fixed VM size offered to tenants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Flavor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub vcpu: u32,
    pub ram_mb: u64,
    pub disk_gb: u64,
    #[serde(default)]
    pub price_month: f64,
}

impl Flavor {
    pub fn ram_gb(&self) -> f64 {
        self.ram_mb as f64 / 1024.0
    }
}

fn downloaded_by_default() -> bool {
    true
}

/// Base image known to the API.
///
/// `GET /images/available` only lists images present on disk, so a missing
/// `downloaded` flag means the image is usable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub name: String,
    #[serde(default)]
    pub size_mb: f64,
    #[serde(default = "downloaded_by_default")]
    pub downloaded: bool,
}

pub fn find_flavor<'a>(flavors: &'a [Flavor], id: &str) -> Option<&'a Flavor> {
    flavors.iter().find(|f| f.id == id)
}

pub fn find_image<'a>(images: &'a [Image], name: &str) -> Option<&'a Image> {
    images.iter().find(|i| i.name == name)
}
