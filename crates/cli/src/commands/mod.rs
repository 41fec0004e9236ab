use clap::Subcommand;
use std::error::Error;

pub mod decode;
pub mod pool;
pub mod transform;

#[derive(Subcommand)]
pub enum Cmd {
    /// Disassemble a classfile's methods to symbolic instructions
    Decode(decode::DecodeArgs),

    /// Dump a classfile's constant pool
    Pool(pool::PoolArgs),

    /// Run the configured transformer pipeline over class files
    Transform(transform::TransformArgs),
}

pub trait Command {
    fn execute(self) -> Result<(), Box<dyn Error>>;
}

impl Command for Cmd {
    fn execute(self) -> Result<(), Box<dyn Error>> {
        match self {
            Cmd::Decode(args) => args.execute(),
            Cmd::Pool(args) => args.execute(),
            Cmd::Transform(args) => args.execute(),
        }
    }
}
