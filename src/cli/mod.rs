//! # Command Line Interface
//!
//! Offline front-end over the translation engine. Manifests are read from YAML
//! files and Services/Secrets given alongside stand in for the informer caches.

pub mod manifest;
pub mod output;

use crate::annotations::GlobalContext;
use crate::config::Settings;
use crate::kube::InMemoryLister;
use crate::observability::{init_logging, log_settings_info};
use crate::translate::{ParsedIngress, Translator};
use anyhow::Context;
use clap::{Parser, Subcommand};
use manifest::Manifest;
use output::{print_output, OutputFormat};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ingress-policy")]
#[command(about = "Translate ingress annotations into gateway and route policy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (YAML, TOML or JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Yaml)]
    pub output: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse annotations and print the per-ingress model with its report
    Parse {
        /// Manifest holding the ingresses
        #[arg(short, long)]
        file: PathBuf,

        /// Manifests holding referenced Services
        #[arg(long)]
        services: Vec<PathBuf>,

        /// Manifests holding referenced Secrets
        #[arg(long)]
        secrets: Vec<PathBuf>,
    },

    /// Translate ingresses into Gateway, VirtualService and TrafficPolicy objects
    Translate {
        /// Manifest holding the ingresses
        #[arg(short, long)]
        file: PathBuf,

        /// Manifests holding referenced Services
        #[arg(long)]
        services: Vec<PathBuf>,

        /// Manifests holding referenced Secrets
        #[arg(long)]
        secrets: Vec<PathBuf>,
    },
}

/// Run CLI commands
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    if cli.verbose {
        settings.logging.level = "debug".to_string();
    }
    init_logging(&settings.logging)?;
    log_settings_info(&settings);

    let translator = Translator::new(settings.engine.clone());
    match cli.command {
        Commands::Parse { file, services, secrets } => {
            let manifest = load_manifests(&file, &services, &secrets)?;
            let mut ctx = context(&translator, &manifest, &settings.engine.cluster_id);
            let parsed = manifest
                .ingresses
                .iter()
                .map(|ingress| translator.parse(ingress, &mut ctx))
                .collect::<Result<Vec<ParsedIngress>, _>>()?;
            print_output(&parsed, cli.output)?;
        }
        Commands::Translate { file, services, secrets } => {
            let manifest = load_manifests(&file, &services, &secrets)?;
            let mut ctx = context(&translator, &manifest, &settings.engine.cluster_id);
            let translation = translator.translate(&manifest.ingresses, &mut ctx)?;
            print_output(&translation, cli.output)?;
        }
    }

    Ok(())
}

/// Ingress manifest plus every Service/Secret manifest, merged
pub fn load_manifests(file: &Path, services: &[PathBuf], secrets: &[PathBuf]) -> anyhow::Result<Manifest> {
    let mut manifest =
        Manifest::from_path(file).with_context(|| format!("Failed to load manifest {}", file.display()))?;
    for path in services.iter().chain(secrets) {
        let extra =
            Manifest::from_path(path).with_context(|| format!("Failed to load manifest {}", path.display()))?;
        manifest.extend(extra);
    }
    Ok(manifest)
}

/// Context whose listers serve the manifest's Services and Secrets for `cluster_id`
pub fn context(translator: &Translator, manifest: &Manifest, cluster_id: &str) -> GlobalContext {
    translator
        .context()
        .with_service_lister(cluster_id, Arc::new(InMemoryLister::new(manifest.services.iter().cloned())))
        .with_secret_lister(cluster_id, Arc::new(InMemoryLister::new(manifest.secrets.iter().cloned())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use clap::CommandFactory;
    use std::io::Write;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn translate_arguments_parse() {
        let cli = Cli::try_parse_from([
            "ingress-policy",
            "translate",
            "-f",
            "ingress.yaml",
            "--services",
            "svc.yaml",
            "--output",
            "json",
        ])
        .expect("parse args");
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Translate { file, services, secrets } => {
                assert_eq!(file, PathBuf::from("ingress.yaml"));
                assert_eq!(services, vec![PathBuf::from("svc.yaml")]);
                assert!(secrets.is_empty());
            }
            Commands::Parse { .. } => panic!("expected translate"),
        }
    }

    #[test]
    fn manifest_services_back_the_lister() {
        let mut ingress = tempfile::Builder::new().suffix(".yaml").tempfile().expect("tempfile");
        write!(
            ingress,
            "apiVersion: networking.k8s.io/v1\nkind: Ingress\nmetadata:\n  name: web\n  namespace: default\n  annotations:\n    higress.io/mirror-target-service: shadow\nspec:\n  rules:\n    - host: foo.com\n      http:\n        paths:\n          - path: /\n            pathType: Prefix\n            backend:\n              service:\n                name: web\n                port:\n                  number: 80\n"
        )
        .expect("write ingress");
        let mut services = tempfile::Builder::new().suffix(".yaml").tempfile().expect("tempfile");
        write!(services, "apiVersion: v1\nkind: Service\nmetadata:\n  name: shadow\n  namespace: default\nspec:\n  ports:\n    - port: 8080\n")
            .expect("write services");

        let manifest =
            load_manifests(ingress.path(), &[services.path().to_path_buf()], &[]).expect("manifests");
        let translator = Translator::new(EngineConfig::default());
        let mut ctx = context(&translator, &manifest, "");
        let translation = translator.translate(&manifest.ingresses, &mut ctx).expect("translate");

        let route = &translation.virtual_services[0].http[0];
        let mirror = route.mirror.as_ref().expect("mirror");
        assert_eq!(mirror.host, "shadow.default.svc.cluster.local");
        assert_eq!(mirror.port.map(|p| p.number), Some(8080));
    }
}
