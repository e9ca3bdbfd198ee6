use serde::Serialize;

use crate::models::{DeployForm, NewUserForm};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Instances,
    Images,
    Billing,
    Hosts,
    Users,
}

impl Tab {
    pub fn admin_only(&self) -> bool {
        matches!(self, Self::Hosts | Self::Users)
    }
}

/// Open/closed state of the deploy dialog.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum DeployDialog {
    #[default]
    Closed,
    Open { selected_flavor: Option<String> },
}

impl DeployDialog {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

/// User intents emitted by the projector.
#[derive(Clone, Debug, PartialEq)]
pub enum UiEvent {
    SelectTab(Tab),
    Refresh,
    OpenDeployDialog,
    CloseDeployDialog,
    SelectFlavor(String),
    SubmitDeploy(DeployForm),
    Start(String),
    Stop(String),
    TestSsh(String),
    RequestDelete {
        target_key: String,
        display_label: String,
    },
    ConfirmDelete,
    CancelDelete,
    CreateUser(NewUserForm),
    DeleteUser {
        user_id: u64,
        username: String,
    },
    ResetPassword {
        user_id: u64,
        username: String,
        password: String,
    },
    Logout,
}
