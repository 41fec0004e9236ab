/// Module for the `transform` subcommand, which builds a transformer
/// pipeline from a JSON config and runs it over class files.
use clap::Args;
use classweave_transform::{
    BootstrapSpec, ConcatFolding, Driver, FailurePolicy, FieldConstantFolding, FoldTarget,
    Transformer,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Arguments for the `transform` subcommand.
#[derive(Args)]
pub struct TransformArgs {
    /// Paths to .class files
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Pipeline configuration (JSON)
    #[arg(long)]
    pub config: PathBuf,

    /// Directory for transformed output; input files are overwritten
    /// in place when omitted
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Keep going past a failing transformer instead of aborting
    #[arg(long)]
    pub isolate: bool,
}

/// On-disk pipeline configuration.
#[derive(Debug, Deserialize)]
struct PipelineConfig {
    /// Per-transformer enable switches; absent transformers stay enabled.
    #[serde(default)]
    modules: HashMap<String, bool>,
    /// Static field reads to fold into constant call sites.
    #[serde(default)]
    fold_targets: Vec<FoldTarget>,
    /// Bootstrap method backing folded call sites; required when
    /// `fold_targets` is non-empty.
    #[serde(default)]
    bootstrap: Option<BootstrapSpec>,
}

impl super::Command for TransformArgs {
    fn execute(self) -> Result<(), Box<dyn Error>> {
        let config: PipelineConfig = serde_json::from_slice(&fs::read(&self.config)?)?;

        let mut builder = Driver::builder()
            .register(Box::new(ConcatFolding::new()) as Box<dyn Transformer>)
            .modules(config.modules);
        if !config.fold_targets.is_empty() {
            let bootstrap = config
                .bootstrap
                .ok_or("config lists fold_targets but no bootstrap method")?;
            builder = builder.register(Box::new(FieldConstantFolding::new(
                config.fold_targets,
                bootstrap,
            )));
        }
        if self.isolate {
            builder = builder.failure_policy(FailurePolicy::Isolate);
        }
        let driver = builder.build();

        if let Some(out) = &self.out {
            fs::create_dir_all(out)?;
        }

        let mut rewritten = 0usize;
        for input in &self.inputs {
            let bytes = fs::read(input)?;
            let name = class_name_of(input);
            match driver.transform_class(&name, &name, &bytes)? {
                Some(out_bytes) => {
                    let dest = match (&self.out, input.file_name()) {
                        (Some(dir), Some(file)) => dir.join(file),
                        _ => input.clone(),
                    };
                    fs::write(&dest, out_bytes)?;
                    rewritten += 1;
                }
                None => {
                    if let (Some(dir), Some(file)) = (&self.out, input.file_name()) {
                        fs::write(dir.join(file), &bytes)?;
                    }
                }
            }
        }
        info!(total = self.inputs.len(), rewritten, "pipeline finished");
        Ok(())
    }
}

fn class_name_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
