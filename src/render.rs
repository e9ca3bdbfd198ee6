//! Text projection of engine state. Reads snapshots, never mutates them.

use chrono::{DateTime, NaiveDateTime};
use comfy_table::{modifiers, presets, Cell, Color, ContentArrangement, Table};
use terminal_size::{terminal_size, Width};
use yansi::Paint;

use crate::engine::{DashboardSnapshot, DeployDialog, Tab};
use crate::models::{
    BillingStatement, Flavor, Host, Image, Instance, InstanceMetrics, InstanceStatus, Role,
    Severity, ToastMessage, UserAccount,
};

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL);
    table.apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    if let Some((Width(w), _)) = terminal_size() {
        table.set_width(w.saturating_sub(4));
    }
    table
}

fn status_cell(status: InstanceStatus) -> Cell {
    let color = match status {
        InstanceStatus::Running => Color::Green,
        InstanceStatus::Stopped => Color::DarkGrey,
        InstanceStatus::Creating => Color::Yellow,
        InstanceStatus::Error => Color::Red,
    };
    Cell::new(status.as_str()).fg(color)
}

fn percent(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Formats an API timestamp as `dd/mm/yyyy HH:MM`, leaving unparseable
/// values untouched.
pub fn format_timestamp(raw: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format("%d/%m/%Y %H:%M").to_string();
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, pattern) {
            return dt.format("%d/%m/%Y %H:%M").to_string();
        }
    }
    raw.to_string()
}

pub fn format_amount(amount: f64) -> String {
    format!("{:.2} FCFA", amount)
}

fn flavor_label(vm: &Instance) -> String {
    if vm.is_custom_sized() {
        format!("ADMIN {} vCPU, {} GB", vm.vcpu, vm.ram_mb as f64 / 1024.0)
    } else if vm.flavor.is_empty() {
        "custom".to_string()
    } else {
        vm.flavor.clone()
    }
}

pub fn instances_table(instances: &[Instance], metrics: &[InstanceMetrics]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Name", "Technical name", "Status", "Flavor", "Image", "IP", "CPU", "RAM"]);
    for vm in instances {
        let sample = metrics.iter().find(|m| m.name == vm.technical_name);
        table.add_row(vec![
            Cell::new(vm.label()),
            Cell::new(&vm.technical_name),
            status_cell(vm.status),
            Cell::new(flavor_label(vm)),
            Cell::new(&vm.image),
            Cell::new(vm.ip_address.as_deref().unwrap_or("-")),
            Cell::new(sample.map(|m| percent(m.cpu_percent)).unwrap_or_else(|| "-".into())),
            Cell::new(sample.map(|m| percent(m.ram_percent)).unwrap_or_else(|| "-".into())),
        ]);
    }
    table
}

pub fn hosts_table(hosts: &[Host]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Host", "URI", "Status", "Free vCPU", "Free RAM (MB)", "VMs"]);
    for host in hosts {
        let status = if host.is_online() {
            Cell::new("online").fg(Color::Green)
        } else {
            Cell::new(host.error.as_deref().unwrap_or("offline")).fg(Color::Red)
        };
        let (vcpu, ram) = match &host.resources {
            Some(r) => (
                format!("{}/{}", r.vcpu.available(), r.vcpu.total),
                format!("{}/{}", r.ram_mb.available(), r.ram_mb.total),
            ),
            None => ("-".into(), "-".into()),
        };
        table.add_row(vec![
            Cell::new(&host.name),
            Cell::new(&host.uri),
            status,
            Cell::new(vcpu),
            Cell::new(ram),
            Cell::new(format!("{}/{}", host.vms_running, host.vms_total)),
        ]);
    }
    table
}

pub fn images_table(images: &[Image]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Image", "Size (MB)", "Downloaded"]);
    for image in images {
        table.add_row(vec![
            Cell::new(&image.name),
            Cell::new(format!("{:.0}", image.size_mb)),
            Cell::new(if image.downloaded { "yes" } else { "no" }),
        ]);
    }
    table
}

pub fn flavors_table(flavors: &[Flavor]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Flavor", "Name", "vCPU", "RAM (GB)", "Disk (GB)", "Price / month"]);
    for flavor in flavors {
        table.add_row(vec![
            Cell::new(&flavor.id),
            Cell::new(&flavor.name),
            Cell::new(flavor.vcpu),
            Cell::new(format!("{:.1}", flavor.ram_gb())),
            Cell::new(flavor.disk_gb),
            Cell::new(format_amount(flavor.price_month)),
        ]);
    }
    table
}

pub fn billing_table(statement: &BillingStatement) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Date", "Description", "Amount"]);
    for entry in &statement.entries {
        table.add_row(vec![
            Cell::new(entry.timestamp.as_deref().map(format_timestamp).unwrap_or_default()),
            Cell::new(&entry.description),
            Cell::new(format_amount(entry.amount)),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total"),
        Cell::new(""),
        Cell::new(format_amount(statement.total())),
    ]);
    table
}

pub fn users_table(users: &[UserAccount]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["ID", "Username", "Email", "Role", "VMs", "Billing", "Created"]);
    for user in users {
        table.add_row(vec![
            Cell::new(user.id),
            Cell::new(&user.username),
            Cell::new(user.email.as_deref().unwrap_or("")),
            Cell::new(if user.is_admin { "admin" } else { "user" }),
            Cell::new(user.vm_count),
            Cell::new(format_amount(user.total_billing)),
            Cell::new(user.created_at.as_deref().map(format_timestamp).unwrap_or_default()),
        ]);
    }
    table
}

pub fn toast_line(toast: &ToastMessage) -> String {
    match toast.severity {
        Severity::Success => toast.text.green().to_string(),
        Severity::Warning => toast.text.yellow().to_string(),
        Severity::Error => toast.text.red().bold().to_string(),
    }
}

/// One full frame of the `watch` screen.
pub fn dashboard(snapshot: &DashboardSnapshot) -> String {
    let mut out = String::new();
    if snapshot.logged_out {
        out.push_str(&"Session closed. Run `fleetdeck login` to sign in again.".red().to_string());
        out.push('\n');
        return out;
    }

    let role = match snapshot.role {
        Some(Role::Admin) => "admin",
        _ => "user",
    };
    out.push_str(&format!(
        "{} {} ({})  {} {}/{}\n",
        "Signed in as".dim(),
        snapshot.username.cyan().bold(),
        role,
        "Running:".dim(),
        snapshot.running_count,
        snapshot.instance_count,
    ));
    if let Some(toast) = &snapshot.toast {
        out.push_str(&toast_line(toast));
        out.push('\n');
    }
    if let Some(pending) = &snapshot.pending_confirmation {
        out.push_str(
            &format!("Delete {} ? (confirm or cancel)", pending.display_label).yellow().to_string(),
        );
        out.push('\n');
    }
    if let DeployDialog::Open { selected_flavor } = &snapshot.deploy_dialog {
        out.push_str(&format!(
            "{} {}\n",
            "Deploy dialog open, flavor:".dim(),
            selected_flavor.as_deref().unwrap_or("-")
        ));
    }

    let table = match snapshot.tab {
        Tab::Instances => instances_table(&snapshot.instances, &snapshot.metrics),
        Tab::Images => images_table(&snapshot.images),
        Tab::Hosts => hosts_table(&snapshot.hosts),
        Tab::Users => users_table(&snapshot.users),
        Tab::Billing => billing_table(&BillingStatement {
            entries: snapshot.billing.clone(),
            total: Some(snapshot.billing_total),
        }),
    };
    out.push_str(&format!("\n{table}\n"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_reformatted() {
        assert_eq!(format_timestamp("2024-05-01T10:30:00"), "01/05/2024 10:30");
        assert_eq!(format_timestamp("2024-05-01T10:30:00.123456"), "01/05/2024 10:30");
        assert_eq!(format_timestamp("2024-05-01T10:30:00+02:00"), "01/05/2024 10:30");
        assert_eq!(format_timestamp("yesterday"), "yesterday");
    }

    #[test]
    fn instance_rows_use_display_label_and_metrics() {
        let vm = Instance {
            technical_name: "user-7-web1".into(),
            display_name: Some("web1".into()),
            flavor: "M".into(),
            image: "debian-12".into(),
            host_id: None,
            status: InstanceStatus::Running,
            ip_address: Some("10.0.0.5".into()),
            vcpu: 2,
            ram_mb: 2048,
        };
        let metrics = vec![InstanceMetrics {
            name: "user-7-web1".into(),
            host: "local".into(),
            cpu_percent: 12.34,
            ram_percent: 50.0,
            disk_gb: 3.0,
        }];
        let rendered = instances_table(&[vm], &metrics).to_string();
        assert!(rendered.contains("web1"));
        assert!(rendered.contains("user-7-web1"));
        assert!(rendered.contains("12.3%"));
        assert!(rendered.contains("10.0.0.5"));
    }

    #[test]
    fn billing_table_ends_with_total() {
        let statement = BillingStatement {
            entries: vec![],
            total: Some(4.5),
        };
        assert!(billing_table(&statement).to_string().contains("4.50 FCFA"));
    }

    #[test]
    fn custom_sized_vms_show_their_resources() {
        let vm = Instance {
            technical_name: "admin-1-build".into(),
            display_name: None,
            flavor: "admin-custom".into(),
            image: "debian-12".into(),
            host_id: Some("kvm-2".into()),
            status: InstanceStatus::Stopped,
            ip_address: None,
            vcpu: 6,
            ram_mb: 12288,
        };
        let rendered = instances_table(&[vm], &[]).to_string();
        assert!(rendered.contains("ADMIN 6 vCPU, 12 GB"));
        assert!(!rendered.contains("admin-custom"));
    }

    #[test]
    fn host_rows_show_free_over_total() {
        let host = Host {
            id: "kvm-1".into(),
            name: "kvm-1".into(),
            uri: "qemu:///system".into(),
            status: crate::models::HostStatus::Online,
            resources: Some(crate::models::HostResources {
                vcpu: crate::models::ResourceUsage { used: 6, total: 16 },
                ram_mb: crate::models::ResourceUsage { used: 8192, total: 32768 },
            }),
            vms_running: 2,
            vms_total: 3,
            error: None,
        };
        let rendered = hosts_table(&[host]).to_string();
        assert!(rendered.contains("10/16"));
        assert!(rendered.contains("24576/32768"));
        assert!(rendered.contains("2/3"));
    }
}
