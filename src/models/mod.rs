pub mod billing;
pub mod catalog;
pub mod fleet_view;
pub mod forms;
pub mod host;
pub mod instance;
pub mod metrics;
pub mod session;
pub mod toast;
pub mod user_account;

pub use billing::{BillingEntry, BillingStatement};
pub use catalog::{Flavor, Image};
pub use fleet_view::FleetView;
pub use forms::{
    DeployContext, DeployForm, DeployRequest, DeploySizing, NewUserForm, ValidationError,
};
pub use host::{Host, HostResources, HostStatus, ResourceUsage};
pub use instance::{Instance, InstanceStatus};
pub use metrics::InstanceMetrics;
pub use session::{Role, Session};
pub use toast::{Severity, ToastMessage};
pub use user_account::{CurrentUser, UserAccount};
