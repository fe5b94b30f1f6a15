mod demo;
mod render;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, WrapErr};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use vault_core::{RuntimeConfig, Store};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Dump a store file as JSON")]
    Inspect { store: PathBuf },
    #[command(about = "Print the state root of a store file")]
    Root { store: PathBuf },
    #[command(about = "Run the fungible-vault scenario and write the resulting store")]
    Demo {
        out: PathBuf,
        /// Runtime config (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn read_store(path: &Path) -> Result<Store> {
    let bytes = std::fs::read(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    Ok(Store::from_bytes(&bytes)?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Inspect { store } => {
            let store = read_store(&store)?;
            let json = serde_json::to_string_pretty(&render::store_json(&store)).into_diagnostic()?;
            println!("{}", json);
        }
        Commands::Root { store } => {
            let store = read_store(&store)?;
            println!("{}", store.state_root()?);
        }
        Commands::Demo { out, config } => {
            let config = match config {
                Some(path) => RuntimeConfig::from_file(&path)?,
                None => RuntimeConfig::default(),
            };
            let rt = demo::run(config)?;
            let store = rt.into_store();
            std::fs::write(&out, store.to_bytes()?)
                .into_diagnostic()
                .wrap_err_with(|| format!("writing {}", out.display()))?;
            info!(root = %store.state_root()?, "wrote {}", out.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_demo_store_reads_back() {
        let store = demo::run(RuntimeConfig::default()).unwrap().into_store();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.bin");
        std::fs::write(&path, store.to_bytes().unwrap()).unwrap();

        let read = read_store(&path).unwrap();
        assert_eq!(read.state_root().unwrap(), store.state_root().unwrap());
        let json = render::store_json(&read);
        assert_eq!(
            json[demo::ALICE.to_string()]["/public/receiver"]["link"],
            serde_json::json!("/storage/vault")
        );
        assert!(read_store(&dir.path().join("missing.bin")).is_err());
    }
}
