use anyhow::Result;
use clap::{Parser, Subcommand};
use std::time::Duration;

use wifi_provision::{
    Outcome, Portal,
    config::{self, Config},
    nmcli::{self, NmcliInterface},
    transport::TcpTransport,
};

#[derive(Parser)]
#[command(name = "wifi-provision")]
#[command(about = "Provision Wi-Fi credentials for a headless device over a temporary access point")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a provisioning session until it reaches a terminal outcome
    Run {
        /// Port to listen on (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,

        /// SSID to broadcast while provisioning
        #[arg(long)]
        ap_ssid: Option<String>,

        /// Station interface (defaults to the first WiFi device)
        #[arg(short, long)]
        interface: Option<String>,

        /// Access-point interface (defaults to the station interface)
        #[arg(long)]
        ap_interface: Option<String>,

        /// Seconds of accept inactivity before the session times out
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Show station connection status
    Status {
        /// Interface to check (defaults to the first WiFi device)
        #[arg(short, long)]
        interface: Option<String>,

        /// Emit the status as JSON
        #[arg(long)]
        json: bool,
    },

    /// List available WiFi interfaces
    ListInterfaces,

    /// Update the configuration file with the given values
    SetConfig {
        /// SSID to broadcast while provisioning
        #[arg(long)]
        ap_ssid: Option<String>,

        /// WPA2 passphrase for the setup network
        #[arg(long)]
        ap_passphrase: Option<String>,

        /// Port the portal listens on
        #[arg(long)]
        port: Option<u16>,

        /// Seconds of accept inactivity before the session times out
        #[arg(long)]
        inactivity_timeout: Option<u64>,

        /// Seconds each station-connection attempt may take
        #[arg(long)]
        attempt_timeout: Option<u32>,

        /// Device for the access-point role
        #[arg(long)]
        ap_interface: Option<String>,

        /// Device for the station role
        #[arg(long)]
        sta_interface: Option<String>,
    },

    /// Show the effective configuration
    ShowConfig,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            port,
            ap_ssid,
            interface,
            ap_interface,
            timeout,
        } => cmd_run(
            port,
            ap_ssid,
            interface.as_deref(),
            ap_interface.as_deref(),
            timeout,
        ),
        Commands::Status { interface, json } => cmd_status(interface.as_deref(), json),
        Commands::ListInterfaces => cmd_list_interfaces(),
        Commands::SetConfig {
            ap_ssid,
            ap_passphrase,
            port,
            inactivity_timeout,
            attempt_timeout,
            ap_interface,
            sta_interface,
        } => cmd_set_config(
            ap_ssid,
            ap_passphrase,
            port,
            inactivity_timeout,
            attempt_timeout,
            ap_interface,
            sta_interface,
        ),
        Commands::ShowConfig => cmd_show_config(),
    }
}

fn cmd_run(
    port: Option<u16>,
    ap_ssid: Option<String>,
    interface: Option<&str>,
    ap_interface: Option<&str>,
    timeout: Option<u64>,
) -> Result<()> {
    let cfg = Config::load().unwrap_or_default();

    let mut settings = cfg.portal_settings();
    if let Some(ssid) = ap_ssid {
        settings.ap.ssid = ssid;
    }
    if let Some(secs) = timeout {
        settings.inactivity_timeout = Duration::from_secs(secs);
    }

    let sta_device = nmcli::resolve_interface(interface.or(cfg.sta_interface.as_deref()))?;
    let ap_device = match ap_interface.or(cfg.ap_interface.as_deref()) {
        Some(name) => nmcli::resolve_interface(Some(name))?,
        None => sta_device.clone(),
    };

    let ap = NmcliInterface::access_point(&ap_device.name, settings.ap.clone());
    let sta = NmcliInterface::station(&sta_device.name);

    let port = port.unwrap_or(cfg.port);
    let mut listener = TcpTransport::bind(port, Duration::from_secs(10))?;

    let mut portal = Portal::new(ap, sta, settings);
    let outcome = portal.run(&mut listener);

    // The caller decides what to do next (e.g. reboot into normal mode);
    // we just hand over the descriptor.
    println!("{outcome}");
    if !matches!(outcome, Outcome::Connected { .. }) {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_status(interface: Option<&str>, json: bool) -> Result<()> {
    let device = nmcli::resolve_interface(interface)?;
    let report = nmcli::device_report(&device.name)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        nmcli::display_report(&report);
    }

    Ok(())
}

fn cmd_list_interfaces() -> Result<()> {
    let interfaces = nmcli::list_wifi_interfaces()?;

    if interfaces.is_empty() {
        println!("No WiFi interfaces found.");
        return Ok(());
    }

    println!("{:<16} {}", "INTERFACE", "STATE");
    println!("{}", "-".repeat(28));

    for iface in interfaces {
        println!("{:<16} {}", iface.name, iface.state);
    }

    Ok(())
}

fn cmd_set_config(
    ap_ssid: Option<String>,
    ap_passphrase: Option<String>,
    port: Option<u16>,
    inactivity_timeout: Option<u64>,
    attempt_timeout: Option<u32>,
    ap_interface: Option<String>,
    sta_interface: Option<String>,
) -> Result<()> {
    let mut cfg = Config::load().unwrap_or_default();

    if let Some(ssid) = ap_ssid {
        cfg.ap_ssid = ssid;
    }
    if let Some(passphrase) = ap_passphrase {
        cfg.ap_passphrase = Some(passphrase);
    }
    if let Some(port) = port {
        cfg.port = port;
    }
    if let Some(secs) = inactivity_timeout {
        cfg.inactivity_timeout_secs = secs;
    }
    if let Some(secs) = attempt_timeout {
        cfg.attempt_timeout_secs = secs;
    }
    if let Some(name) = ap_interface {
        cfg.ap_interface = Some(name);
    }
    if let Some(name) = sta_interface {
        cfg.sta_interface = Some(name);
    }

    cfg.save()?;
    println!("Saved config to {}", config::config_path()?.display());

    Ok(())
}

fn cmd_show_config() -> Result<()> {
    let path = config::config_path()?;
    println!("Config file: {}", path.display());
    println!();

    let cfg = Config::load()?;
    print!("{}", toml::to_string_pretty(&cfg)?);

    Ok(())
}
