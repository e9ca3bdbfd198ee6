use crate::models::billing::BillingStatement;
use crate::models::catalog::{Flavor, Image};
use crate::models::host::Host;
use crate::models::instance::Instance;
use crate::models::metrics::InstanceMetrics;
use crate::models::user_account::UserAccount;

/// Locally held copy of every polled collection.
///
/// Each field is written only by the poll scheduler, one feed per field, and
/// always replaced wholesale.
#[derive(Clone, Debug, Default)]
pub struct FleetView {
    pub instances: Vec<Instance>,
    pub metrics: Vec<InstanceMetrics>,
    pub hosts: Vec<Host>,
    pub images: Vec<Image>,
    pub available_images: Vec<Image>,
    pub flavors: Vec<Flavor>,
    pub billing: BillingStatement,
    pub users: Vec<UserAccount>,
}

impl FleetView {
    pub fn running_count(&self) -> usize {
        self.instances.iter().filter(|vm| vm.is_running()).count()
    }

    pub fn instance(&self, technical_name: &str) -> Option<&Instance> {
        self.instances
            .iter()
            .find(|vm| vm.technical_name == technical_name)
    }

    pub fn online_hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.iter().filter(|h| h.is_online())
    }
}
