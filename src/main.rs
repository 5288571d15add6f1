#![cfg(feature = "cli")]
use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::Engine;
use clap::{ArgAction, Parser, Subcommand};
use serde::Deserialize;

use rsfairplay::constants::tag;
use rsfairplay::credentials::{Credentials, CredentialsConfig};
use rsfairplay::rules::DefaultPolicy;
use rsfairplay::server::KeyServer;
use rsfairplay::spc::{SpcContainer, SpcData};
use rsfairplay::{json, tllv};

#[cfg(feature = "chrono")]
use chrono::Datelike;

use tracing::{error, info, warn, Level};

#[derive(Parser)]
#[command(name = "rsfairplay", version, disable_version_flag = true, about = "rsfairplay CLI")]
struct Cli {
    #[arg(short = 'v', long = "version", action = ArgAction::SetTrue)]
    version: bool,

    #[arg(short = 'd', long = "debug", action = ArgAction::SetTrue)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Process a create-ckc JSON request locally and print the response.
    Process {
        /// Request document.
        input: PathBuf,
        /// YAML config with a `credentials` section.
        #[arg(short = 'c', long = "config")]
        config: PathBuf,
        /// Write the response here instead of stdout.
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Decrypt an SPC and list its TLLVs.
    Inspect {
        /// Base64 SPC, or a file holding a raw or base64 SPC.
        spc: String,
        /// YAML config with a `credentials` section.
        #[arg(short = 'c', long = "config")]
        config: PathBuf,
    },
    #[cfg(feature = "serve")]
    /// Serve the key server over HTTP.
    Serve {
        config_path: PathBuf,
        #[arg(short = 'h', long = "host", default_value = "127.0.0.1")]
        host: String,
        #[arg(short = 'p', long = "port", default_value = "8787")]
        port: u16,
    },
    #[cfg(feature = "remote")]
    /// Send a create-ckc JSON request to a remote key server.
    Request {
        url: String,
        input: PathBuf,
        #[arg(short = 's', long = "secret")]
        secret: Option<String>,
    },
}

/// The part of the config file the CLI needs.
#[derive(Debug, Default, Deserialize)]
struct CliConfig {
    #[serde(default)]
    credentials: CredentialsConfig,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let copyright_years = format!("2025-{}", current_year());
    let version = env!("CARGO_PKG_VERSION");
    info!("rsfairplay version {} Copyright (c) {}", version, copyright_years);

    if cli.version {
        return Ok(());
    }

    match cli.command {
        Some(Commands::Process {
            input,
            config,
            output,
        }) => run_process(&input, &config, output.as_deref()),
        Some(Commands::Inspect { spc, config }) => run_inspect(&spc, &config),
        #[cfg(feature = "serve")]
        Some(Commands::Serve {
            config_path,
            host,
            port,
        }) => run_serve(&config_path, &host, port),
        #[cfg(feature = "remote")]
        Some(Commands::Request { url, input, secret }) => run_request(&url, &input, secret),
        None => Ok(()),
    }
}

fn current_year() -> i64 {
    #[cfg(feature = "chrono")]
    {
        chrono::Local::now().year().into()
    }
    #[cfg(not(feature = "chrono"))]
    {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() / 31_536_000 + 1970)
            .unwrap_or(2025) as i64
    }
}

fn load_credentials(config_path: &Path) -> anyhow::Result<Credentials> {
    let data = std::fs::read_to_string(config_path).context("Failed to read config")?;
    let config: CliConfig = serde_yaml::from_str(&data).context("Failed to parse config")?;
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));
    let credentials = Credentials::load(&config.credentials.relative_to(base))
        .context("Failed to load credentials")?;
    Ok(credentials)
}

fn build_server(credentials: Credentials) -> KeyServer {
    #[cfg(feature = "ksm")]
    {
        KeyServer::new(credentials, rsfairplay::ksm::KsmKeyPayloadProvider)
    }
    #[cfg(not(feature = "ksm"))]
    {
        warn!("Built without the `ksm` feature, content key payloads are unavailable");
        KeyServer::new(credentials, rsfairplay::payload::UnavailableKeyPayloadProvider)
    }
}

fn run_process(input: &Path, config: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let server = build_server(load_credentials(config)?);
    let request = std::fs::read_to_string(input).context("Failed to read request")?;

    let response = json::process_request(&server, &request);
    let text = serde_json::to_string_pretty(&response)?;

    match output {
        Some(path) => {
            std::fs::write(path, text).context("Failed to write response")?;
            info!("[+] Saved response to {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn read_spc(spc: &str) -> anyhow::Result<Vec<u8>> {
    let path = Path::new(spc);
    let data = if path.is_file() {
        std::fs::read(path).context("Failed to read SPC file")?
    } else {
        spc.as_bytes().to_vec()
    };

    let trimmed = String::from_utf8_lossy(&data).trim().to_string();
    match base64::engine::general_purpose::STANDARD.decode(&trimmed) {
        Ok(decoded) => Ok(decoded),
        Err(_) if path.is_file() => Ok(data),
        Err(e) => Err(anyhow::anyhow!("SPC is neither a file nor base64: {}", e)),
    }
}

fn run_inspect(spc: &str, config: &Path) -> anyhow::Result<()> {
    let credentials = load_credentials(config)?;
    let spc = read_spc(spc)?;

    let mut container = SpcContainer::parse_header(&spc).context("Invalid SPC header")?;
    info!("[+] SPC version {} ({} bytes)", container.version, spc.len());
    info!(" + Certificate hash: {}", hex::encode(container.certificate_hash));
    info!(" + Payload: {} bytes", container.payload_size);

    container
        .decrypt(&spc, &credentials)
        .context("Failed to decrypt SPC")?;
    let payload = &container.decrypted_payload;

    let records = tllv::decode_all(payload, payload.len()).context("Failed to decode TLLVs")?;
    info!("[+] {} TLLVs", records.len());
    for record in &records {
        let value = if record.value.len() > 32 {
            format!("{}...", hex::encode(&record.value[..32]))
        } else {
            hex::encode(&record.value)
        };
        info!(
            " + {} (0x{:016x}) {} bytes: {}",
            tag::name(record.tag),
            record.tag,
            record.value.len(),
            value
        );
    }

    match SpcData::parse(payload, &DefaultPolicy) {
        Ok(data) => {
            info!("[+] SPC is valid, asset id {}", String::from_utf8_lossy(&data.asset_id));
            if let Some(playback) = data.playback {
                info!(
                    " + Playback id {} state {:?} created {}",
                    playback.playback_id,
                    playback.state,
                    format_date(playback.date)
                );
            }
            if let Some(identity) = &data.device_identity {
                info!(
                    " + Device class {:?}, OS version {:08X}",
                    identity.device_class, identity.os_version
                );
            }
        }
        Err(e) => error!("[-] SPC failed validation: {}", e),
    }
    Ok(())
}

fn format_date(seconds: u32) -> String {
    #[cfg(feature = "chrono")]
    {
        chrono::DateTime::from_timestamp(i64::from(seconds), 0)
            .map(|date| date.to_rfc3339())
            .unwrap_or_else(|| seconds.to_string())
    }
    #[cfg(not(feature = "chrono"))]
    {
        format!("{} (unix time)", seconds)
    }
}

#[cfg(feature = "serve")]
fn run_serve(config_path: &Path, host: &str, port: u16) -> anyhow::Result<()> {
    let config = rsfairplay::serve::ServeConfig::from_path(config_path)?;
    let credentials = Credentials::load(&config.credentials).context("Failed to load credentials")?;
    let server = build_server(credentials);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create runtime")?;
    runtime.block_on(rsfairplay::serve::run(config, server, host, port))?;
    Ok(())
}

#[cfg(feature = "remote")]
fn run_request(url: &str, input: &Path, secret: Option<String>) -> anyhow::Result<()> {
    let request = std::fs::read_to_string(input).context("Failed to read request")?;
    let request: serde_json::Value = serde_json::from_str(&request).context("Invalid request JSON")?;

    let remote = rsfairplay::remote::RemoteKeyServer::new(url, secret)?;
    let response = remote.send(&request)?;
    for result in json::parse_response(&response)? {
        info!("[{}] {} ckc {} bytes", result.id, result.status, result.ckc.len());
    }
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
