use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use yansi::Paint;

use fleetdeck::api::{self, ApiError, FleetApi, FleetClient};
use fleetdeck::config;
use fleetdeck::credentials::CredentialStore;
use fleetdeck::engine::{
    dashboard::describe_api_error, ChangeSignal, CommandOutcome, Dashboard, EngineConfig,
    EngineError, Feed, RefreshOutcome, SessionGuard, Tab, UiEvent,
};
use fleetdeck::models::{DeployForm, DeploySizing, NewUserForm, Role, Session};
use fleetdeck::render;

#[derive(Parser)]
#[command(
    name = "fleetdeck",
    author,
    version,
    about = "FleetDeck command-line client",
    long_about = r#"FleetDeck: drive your VM fleet from the terminal.

Sign in once with `fleetdeck login`; the token is stored locally and reused by
every other command until the API rejects it.

Examples:
  1) Sign in:
      fleetdeck login alice
  2) Live dashboard:
      fleetdeck watch
  3) Manage VMs:
      fleetdeck vms list
      fleetdeck vms deploy web1 --flavor M --image debian-12 --user admin --password s3cret
      fleetdeck vms delete user-7-web1 --yes
"#,
    after_help = "Use `fleetdeck <subcommand> --help` to get subcommand specific options and usage examples."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Disable colorized output
    #[arg(long, global = true)]
    no_color: bool,
    /// Disable request/response logging
    #[arg(long, global = true)]
    silent: bool,
    /// Path to .env file
    #[arg(long, global = true)]
    env_file: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session token
    Login {
        username: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the identity behind the stored session
    Whoami,
    /// Manage virtual machines
    #[command(about = "Manage VMs (list, start, stop, delete, deploy, test-ssh)", long_about = "Commands address VMs by technical name, as shown in the `Technical name` column of `vms list`. State changes are confirmed by the next poll, not assumed.")]
    Vms {
        #[command(subcommand)]
        sub: VmCommands,
    },
    /// Show KVM host status (admin)
    Hosts,
    /// List base images
    Images {
        /// Only images already present on disk
        #[arg(long)]
        available: bool,
    },
    /// List VM flavors
    Flavors,
    /// Show billing history
    Billing,
    /// Manage tenant accounts (admin)
    Users {
        #[command(subcommand)]
        sub: UserCommands,
    },
    /// Live dashboard that refreshes until interrupted
    Watch {
        #[arg(long, value_enum, default_value_t = TabArg::Instances)]
        tab: TabArg,
    },
    /// Validate configuration and API connectivity
    #[command(about = "Validate configuration and ensure API connectivity.", long_about = "Print the effective configuration, then contact the API: with a stored session the identity is verified, otherwise the flavor catalog is requested.")]
    CheckConfig,
}

#[derive(Subcommand)]
enum VmCommands {
    #[command(about = "List VMs with live usage")]
    List,
    #[command(about = "Start a VM")]
    Start { name: String },
    #[command(about = "Stop a VM")]
    Stop { name: String },
    #[command(about = "Delete a VM", long_about = "Permanently delete a VM. Refuses to run without --yes.")]
    Delete {
        name: String,
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    #[command(about = "Deploy a new VM", long_about = "Deploy from a flavor (`--flavor`) or, for admins, from explicit resources (`--vcpu`, `--ram-mb`, `--disk-gb`, optional `--host`).")]
    Deploy {
        name: String,
        #[arg(long)]
        image: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        flavor: Option<String>,
        #[arg(long)]
        ssh_key: Option<String>,
        #[arg(long)]
        vcpu: Option<u32>,
        #[arg(long)]
        ram_mb: Option<u64>,
        #[arg(long)]
        disk_gb: Option<u64>,
        #[arg(long)]
        host: Option<String>,
    },
    #[command(about = "Check that SSH answers on a VM")]
    TestSsh { name: String },
}

#[derive(Subcommand)]
enum UserCommands {
    #[command(about = "List tenant accounts")]
    List,
    #[command(about = "Create a tenant account")]
    Add {
        username: String,
        password: String,
        #[arg(long)]
        email: Option<String>,
    },
    #[command(about = "Delete a tenant account")]
    Delete { user_id: u64, username: Option<String> },
    #[command(about = "Set a new password for an account")]
    ResetPassword { user_id: u64, password: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum TabArg {
    Instances,
    Images,
    Billing,
    Hosts,
    Users,
}

impl From<TabArg> for Tab {
    fn from(arg: TabArg) -> Self {
        match arg {
            TabArg::Instances => Tab::Instances,
            TabArg::Images => Tab::Images,
            TabArg::Billing => Tab::Billing,
            TabArg::Hosts => Tab::Hosts,
            TabArg::Users => Tab::Users,
        }
    }
}

struct Context {
    api: Arc<FleetClient>,
    store: CredentialStore,
    engine: EngineConfig,
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("{}", msg.to_string().red());
    process::exit(1);
}

fn build_context(env_file: Option<&str>) -> Context {
    config::load_env_file(env_file);
    let api = match FleetClient::new(config::get_api_base_url(), config::get_http_timeout()) {
        Ok(api) => api,
        Err(e) => {
            tracing::error!(%e, "Failed to build HTTP client");
            fail(e);
        }
    };
    Context {
        api: Arc::new(api),
        store: CredentialStore::new(config::get_credentials_file()),
        engine: config::get_engine_config(),
    }
}

async fn open_dashboard(ctx: &Context) -> Dashboard {
    let changes = ChangeSignal::new();
    let guard = match SessionGuard::from_store(ctx.store.clone(), changes.clone()) {
        Ok(guard) => guard,
        Err(e) => fail(e),
    };
    let api: Arc<dyn FleetApi> = ctx.api.clone();
    match Dashboard::open(api, guard, changes, ctx.engine.clone()).await {
        Ok(dashboard) => dashboard,
        Err(EngineError::LoginRequired) => fail(EngineError::LoginRequired),
        Err(EngineError::Api(e)) => fail(format!("API error: {}", describe_api_error(&e))),
        Err(e) => fail(e),
    }
}

async fn load_feed(dashboard: &Dashboard, feed: Feed) {
    match dashboard.scheduler().refresh(feed).await {
        RefreshOutcome::Applied { .. } => {}
        RefreshOutcome::Failed(e) => fail(format!("Failed to load {}: {}", feed, describe_api_error(&e))),
        RefreshOutcome::Cancelled => fail(describe_api_error(&ApiError::SessionClosed)),
        other => tracing::debug!(%feed, ?other, "Unexpected refresh outcome"),
    }
}

/// Prints every toast the command produced and exits non-zero unless it
/// completed.
fn finish(dashboard: &Dashboard, outcome: CommandOutcome) {
    for toast in dashboard.notifications().drain() {
        println!("{}", render::toast_line(&toast));
    }
    match outcome {
        CommandOutcome::Completed => {}
        CommandOutcome::Ignored => fail("Another command for this target is still pending"),
        CommandOutcome::SessionEnded => fail(describe_api_error(&ApiError::SessionClosed)),
        _ => process::exit(1),
    }
}

async fn read_password() -> String {
    eprint!("Password: ");
    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());
    if let Err(e) = stdin.read_line(&mut line).await {
        fail(format!("Failed to read password: {}", e));
    }
    line.trim_end_matches(['\r', '\n']).to_string()
}

async fn login(ctx: &Context, username: String, password: Option<String>) {
    let password = match password {
        Some(p) => p,
        None => read_password().await,
    };
    let response = match ctx.api.login(&username, &password).await {
        Ok(r) => r,
        Err(ApiError::Unauthorized) => fail("Invalid username or password"),
        Err(e) => fail(format!("Login failed: {}", e)),
    };
    let me = match ctx.api.current_user(Some(&response.token)).await {
        Ok(me) => me,
        Err(e) => fail(format!("Login failed: {}", e)),
    };
    let session = Session {
        token: response.token,
        username: me.username,
        role: Role::from_admin_flag(me.is_admin),
    };
    if let Err(e) = ctx.store.save(&session) {
        fail(e);
    }
    tracing::info!(username = %session.username, "Logged in");
    println!(
        "{} {} ({})",
        "Logged in as".green(),
        session.username.cyan(),
        if session.role.is_admin() { "admin" } else { "user" }
    );
}

async fn watch(dashboard: Dashboard, tab: Tab) {
    dashboard.start().await;
    if tab != Tab::Instances {
        dashboard.handle(UiEvent::SelectTab(tab)).await;
    }
    let mut changes = dashboard.subscribe();
    let logged_out = dashboard.logged_out();
    tokio::pin!(logged_out);
    // Toasts advance when read, so redraw at least once a second.
    let mut redraw = tokio::time::interval(Duration::from_secs(1));

    loop {
        print!("\x1B[2J\x1B[H{}", render::dashboard(&dashboard.snapshot()));
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = redraw.tick() => {}
            _ = &mut logged_out => {
                print!("\x1B[2J\x1B[H{}", render::dashboard(&dashboard.snapshot()));
                process::exit(1);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    dashboard.shutdown();
}

async fn check_config(ctx: &Context) {
    println!("{} {}", "API:".bold(), ctx.api.api_base_url());
    println!("{} {}", "Credentials:".bold(), ctx.store.path().display());
    let session = match ctx.store.load() {
        Ok(s) => s,
        Err(e) => fail(e),
    };
    match session {
        Some(session) => match ctx.api.current_user(Some(&session.token)).await {
            Ok(me) => println!("{} {}", "Session valid for".green(), me.username.cyan()),
            Err(ApiError::Unauthorized) => fail("Stored session was rejected; run `fleetdeck login`"),
            Err(e) => fail(format!("Configuration appears invalid: {}", e)),
        },
        None => match ctx.api.list_flavors(None).await {
            Ok(_) | Err(ApiError::Unauthorized) => {
                println!("{}", "API reachable (not logged in)".green())
            }
            Err(e) => fail(format!("Configuration appears invalid: {}", e)),
        },
    }
}

async fn run_vm_command(ctx: &Context, sub: VmCommands) {
    let dashboard = open_dashboard(ctx).await;
    match sub {
        VmCommands::List => {
            load_feed(&dashboard, Feed::Instances).await;
            load_feed(&dashboard, Feed::Metrics).await;
            let view = dashboard.scheduler().view();
            println!("\n{}", render::instances_table(&view.instances, &view.metrics));
            println!(
                "{}\n",
                format!("{} running / {} total", view.running_count(), view.instances.len()).dim()
            );
        }
        VmCommands::Start { name } => {
            let outcome = dashboard.handle(UiEvent::Start(name)).await;
            finish(&dashboard, outcome);
        }
        VmCommands::Stop { name } => {
            let outcome = dashboard.handle(UiEvent::Stop(name)).await;
            finish(&dashboard, outcome);
        }
        VmCommands::Delete { name, yes } => {
            if !yes {
                fail(format!("Refusing to delete {} without --yes", name));
            }
            load_feed(&dashboard, Feed::Instances).await;
            let display_label = dashboard.scheduler().label_for(&name);
            dashboard
                .handle(UiEvent::RequestDelete {
                    target_key: name,
                    display_label,
                })
                .await;
            let outcome = dashboard.handle(UiEvent::ConfirmDelete).await;
            finish(&dashboard, outcome);
        }
        VmCommands::Deploy {
            name,
            image,
            user,
            password,
            flavor,
            ssh_key,
            vcpu,
            ram_mb,
            disk_gb,
            host,
        } => {
            let sizing = match (flavor, vcpu, ram_mb, disk_gb) {
                (Some(id), _, _, _) => Some(DeploySizing::Flavor(id)),
                (None, Some(vcpu), Some(ram_mb), Some(disk_gb)) => Some(DeploySizing::Custom {
                    vcpu,
                    ram_mb,
                    disk_gb,
                    host,
                }),
                (None, None, None, None) => None,
                _ => fail("Custom sizing needs --vcpu, --ram-mb and --disk-gb together"),
            };
            dashboard.handle(UiEvent::OpenDeployDialog).await;
            let form = DeployForm {
                name,
                sizing,
                image,
                user,
                password,
                ssh_key,
            };
            let outcome = dashboard.handle(UiEvent::SubmitDeploy(form)).await;
            finish(&dashboard, outcome);
        }
        VmCommands::TestSsh { name } => {
            load_feed(&dashboard, Feed::Instances).await;
            let outcome = dashboard.handle(UiEvent::TestSsh(name)).await;
            finish(&dashboard, outcome);
        }
    }
}

async fn run_user_command(ctx: &Context, sub: UserCommands) {
    let dashboard = open_dashboard(ctx).await;
    match sub {
        UserCommands::List => {
            if dashboard.role() != Some(Role::Admin) {
                fail("Accès réservé aux administrateurs");
            }
            load_feed(&dashboard, Feed::Users).await;
            println!("\n{}\n", render::users_table(&dashboard.scheduler().view().users));
        }
        UserCommands::Add {
            username,
            password,
            email,
        } => {
            let form = NewUserForm {
                username,
                email,
                password,
            };
            let outcome = dashboard.handle(UiEvent::CreateUser(form)).await;
            finish(&dashboard, outcome);
        }
        UserCommands::Delete { user_id, username } => {
            let username = username.unwrap_or_else(|| format!("#{}", user_id));
            let outcome = dashboard
                .handle(UiEvent::DeleteUser { user_id, username })
                .await;
            finish(&dashboard, outcome);
        }
        UserCommands::ResetPassword { user_id, password } => {
            let outcome = dashboard
                .handle(UiEvent::ResetPassword {
                    user_id,
                    username: format!("#{}", user_id),
                    password,
                })
                .await;
            finish(&dashboard, outcome);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Logs go to stderr so they never interleave with tables or the watch screen
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.no_color {
        yansi::whenever(yansi::Condition::NEVER);
    }

    if cli.silent {
        api::set_silent(true);
    }

    let Some(command) = cli.command else {
        eprintln!("{}", "No command given. Try `fleetdeck --help`.".yellow());
        process::exit(2);
    };
    let ctx = build_context(cli.env_file.as_deref());

    match command {
        Commands::Login { username, password } => login(&ctx, username, password).await,
        Commands::Logout => {
            let guard = match SessionGuard::from_store(ctx.store.clone(), ChangeSignal::new()) {
                Ok(guard) => guard,
                Err(e) => fail(e),
            };
            if guard.logout() {
                println!("{}", "Logged out".green());
            } else {
                println!("{}", "Not logged in".yellow());
            }
        }
        Commands::Whoami => {
            let dashboard = open_dashboard(&ctx).await;
            let snapshot = dashboard.snapshot();
            let role = match snapshot.role {
                Some(Role::Admin) => "admin",
                _ => "user",
            };
            println!("{} ({})", snapshot.username.cyan(), role);
        }
        Commands::Vms { sub } => run_vm_command(&ctx, sub).await,
        Commands::Hosts => {
            let dashboard = open_dashboard(&ctx).await;
            if dashboard.role() != Some(Role::Admin) {
                fail("Accès réservé aux administrateurs");
            }
            load_feed(&dashboard, Feed::Hosts).await;
            println!("\n{}\n", render::hosts_table(&dashboard.scheduler().view().hosts));
        }
        Commands::Images { available } => {
            let dashboard = open_dashboard(&ctx).await;
            let feed = if available { Feed::AvailableImages } else { Feed::Images };
            load_feed(&dashboard, feed).await;
            let view = dashboard.scheduler().view();
            let images = if available { &view.available_images } else { &view.images };
            if images.is_empty() {
                println!("(empty list)");
            } else {
                println!("\n{}\n", render::images_table(images));
            }
        }
        Commands::Flavors => {
            let dashboard = open_dashboard(&ctx).await;
            load_feed(&dashboard, Feed::Flavors).await;
            println!("\n{}\n", render::flavors_table(&dashboard.scheduler().view().flavors));
        }
        Commands::Billing => {
            let dashboard = open_dashboard(&ctx).await;
            load_feed(&dashboard, Feed::Billing).await;
            println!("\n{}\n", render::billing_table(&dashboard.scheduler().view().billing));
        }
        Commands::Users { sub } => run_user_command(&ctx, sub).await,
        Commands::Watch { tab } => {
            let dashboard = open_dashboard(&ctx).await;
            watch(dashboard, tab.into()).await;
        }
        Commands::CheckConfig => check_config(&ctx).await,
    }
}
