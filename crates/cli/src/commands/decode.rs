/// Module for the `decode` subcommand, which disassembles a classfile into
/// the symbolic instruction listing the transformers operate on.
use clap::Args;
use classweave_core::parse_class;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

/// Arguments for the `decode` subcommand.
#[derive(Args)]
pub struct DecodeArgs {
    /// Path to a .class file
    pub input: PathBuf,

    /// Only print methods whose name matches
    #[arg(long)]
    method: Option<String>,
}

impl super::Command for DecodeArgs {
    fn execute(self) -> Result<(), Box<dyn Error>> {
        let bytes = fs::read(&self.input)?;
        let class = parse_class(&bytes)?;

        println!(
            "class {} (version {}.{})",
            class.name, class.major_version, class.minor_version
        );
        if let Some(super_name) = &class.super_name {
            println!("  extends {super_name}");
        }
        for interface in &class.interfaces {
            println!("  implements {interface}");
        }
        for field in &class.fields {
            println!("  field {} {}", field.name, field.descriptor);
        }

        for method in &class.methods {
            if let Some(filter) = &self.method {
                if method.name != *filter {
                    continue;
                }
            }
            println!();
            println!(
                "  method {}{} (stack {}, locals {})",
                method.name, method.descriptor, method.max_stack, method.max_locals
            );
            for (i, insn) in method.instructions.iter().enumerate() {
                println!("    {i:4}: {insn}");
            }
            for tc in &method.try_catches {
                let catch = tc.catch_type.as_deref().unwrap_or("<any>");
                println!(
                    "    try {}..{} handler {} catch {}",
                    tc.start, tc.end, tc.handler, catch
                );
            }
        }
        Ok(())
    }
}
