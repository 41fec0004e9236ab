/// Module for the `pool` subcommand, which dumps a classfile's constant
/// pool with parsed indices.
use clap::Args;
use classweave_core::parse_class;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

/// Arguments for the `pool` subcommand.
#[derive(Args)]
pub struct PoolArgs {
    /// Path to a .class file
    pub input: PathBuf,
}

impl super::Command for PoolArgs {
    fn execute(self) -> Result<(), Box<dyn Error>> {
        let bytes = fs::read(&self.input)?;
        let class = parse_class(&bytes)?;

        println!("constant pool of {} ({} slots)", class.name, class.pool.count());
        for (index, entry) in class.pool.entries() {
            println!("  #{index:<4} {entry}");
        }
        if !class.bootstrap_methods.is_empty() {
            println!();
            println!("bootstrap methods:");
            for (i, bsm) in class.bootstrap_methods.iter().enumerate() {
                println!("  {i}: {}", bsm.handle);
                for arg in &bsm.args {
                    println!("       arg {arg}");
                }
            }
        }
        Ok(())
    }
}
