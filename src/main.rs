//! PKI Keeper - command-line host
//!
//! Drives the [`pki_keeper::Pki`] facade against the directory-backed store named in
//! the configuration file. Every subcommand maps to one facade operation; lists are
//! printed as JSON display metadata.
//!
//! # Quick Start
//!
//! ```bash
//! pki-keeper issue-ca --cn "Home Lab CA"
//! pki-keeper issue <CA-FINGERPRINT> --cn nas.home.arpa --san 192.168.1.10
//! pki-keeper export <LEAF-FINGERPRINT> --out-dir exports
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pki_keeper::certificate::{Certificate, CertificateInfo};
use pki_keeper::configs::{AppConfig, DEFAULT_CONFIG_PATH};
use pki_keeper::issuance::{AuthorityRequest, LeafRequest};
use pki_keeper::keys;
use pki_keeper::Pki;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pki-keeper")]
#[command(about = "Self-hosted CA and leaf certificate management")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a PKCS#12 or PEM bundle that includes the private key
    Import {
        file: PathBuf,
        /// Bundle password
        #[arg(short, long)]
        password: Option<String>,
    },

    /// List CAs
    Authorities,

    /// Issue a new self-signed CA
    IssueCa {
        /// Common name
        #[arg(long)]
        cn: String,
        /// Validity in days (defaults to issuance.authority_validity_days)
        #[arg(long)]
        days: Option<u32>,
    },

    /// List certificates issued by a CA
    Children { fingerprint: String },

    /// Write the certificate as PEM
    Cert {
        fingerprint: String,
        /// Directory to write to; prints to stdout when absent
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },

    /// Write the private key as unencrypted PKCS#8 PEM
    Key {
        fingerprint: String,
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },

    /// Write certificate and key as a PKCS#12 bundle
    Export {
        fingerprint: String,
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
        /// Protect the bundle with a passphrase
        #[arg(long)]
        passphrase: Option<String>,
    },

    /// Delete a certificate; deleting a CA also deletes what it issued
    Delete { fingerprint: String },

    /// Issue a leaf certificate under a CA
    Issue {
        /// Fingerprint of the issuing CA
        parent: String,
        /// Common name, always included as a SAN
        #[arg(long)]
        cn: String,
        /// Validity in days (defaults to issuance.leaf_validity_days)
        #[arg(long)]
        days: Option<u32>,
        /// Additional DNS names or IP addresses
        #[arg(long = "san")]
        sans: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    init_tracing(&config, cli.verbose);

    let mut pki = Pki::open(&config).context("Failed to open certificate store")?;

    match cli.command {
        Commands::Import { file, password } => {
            let data =
                fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            let fingerprint = pki.import_certificate(&data, &name, password.as_deref())?;
            println!("{}", fingerprint);
        }
        Commands::Authorities => print_list(&pki.list_authorities())?,
        Commands::IssueCa { cn, days } => {
            let mut request = AuthorityRequest::new(cn);
            if let Some(days) = days {
                request = request.validity_days(days);
            }
            println!("{}", pki.issue_authority(&request)?);
        }
        Commands::Children { fingerprint } => print_list(&pki.list_children(&fingerprint)?)?,
        Commands::Cert {
            fingerprint,
            out_dir,
        } => {
            let pem = pki.certificate_pem(&fingerprint)?;
            let name = pki.file_name(&fingerprint, ".crt")?;
            emit(out_dir.as_deref(), &name, pem.as_bytes(), false)?;
        }
        Commands::Key {
            fingerprint,
            out_dir,
        } => {
            let pem = pki.private_key_pem(&fingerprint)?;
            let name = pki.file_name(&fingerprint, ".key")?;
            emit(out_dir.as_deref(), &name, pem.as_bytes(), true)?;
        }
        Commands::Export {
            fingerprint,
            out_dir,
            passphrase,
        } => {
            let bundle = pki.export_pkcs12(&fingerprint, passphrase.as_deref())?;
            let name = pki.file_name(&fingerprint, ".pfx")?;
            emit(Some(&out_dir), &name, &bundle, true)?;
        }
        Commands::Delete { fingerprint } => {
            pki.delete_certificate(&fingerprint)?;
            println!("✓ Deleted {}", fingerprint);
        }
        Commands::Issue {
            parent,
            cn,
            days,
            sans,
        } => {
            let mut request = LeafRequest::new(cn).subject_alt_names(sans);
            if let Some(days) = days {
                request = request.validity_days(days);
            }
            println!("{}", pki.issue_leaf(&parent, &request)?);
        }
    }

    Ok(())
}

/// The configured file, or the defaults when it does not exist.
fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let path = path
        .to_str()
        .with_context(|| format!("Config path is not UTF-8: {}", path.display()))?;
    AppConfig::from_file(path)
}

fn init_tracing(config: &AppConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_list(certificates: &[Certificate]) -> Result<()> {
    let infos: Vec<CertificateInfo> = certificates.iter().map(Certificate::info).collect();
    println!("{}", serde_json::to_string_pretty(&infos)?);
    Ok(())
}

/// Write `contents` to `out_dir/name`, or print it. Files holding private keys are
/// created owner-only.
fn emit(out_dir: Option<&Path>, name: &str, contents: &[u8], private: bool) -> Result<()> {
    match out_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            let path = dir.join(name);
            if private {
                keys::write_private_file(&path, contents)?;
            } else {
                fs::write(&path, contents)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            println!("✓ Wrote {}", path.display());
        }
        None => print!("{}", String::from_utf8_lossy(contents)),
    }
    Ok(())
}
