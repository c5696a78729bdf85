mod dump_frame;
use dump_frame::dump_frame;
mod dump_value;
use dump_value::dump_value;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Inspect Hessian 2.0 payloads and Dubbo frames
#[derive(Clone, Debug, Parser)]
struct Args {
    // operation to execute
    #[command(subcommand)]
    operation: Operation,
}

#[derive(Clone, Debug, Subcommand)]
enum Operation {
    /// Decode the Hessian values in a file and print them
    DumpValue {
        /// input filename, raw Hessian bytes
        input: PathBuf,
        /// treat the input as hex text instead of raw bytes
        #[arg(short = 'x', long)]
        hex: bool,
    },
    /// Read Dubbo frames from a file, print each header and decoded body
    DumpFrame {
        /// input filename containing one or more frames
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    match &args.operation {
        Operation::DumpValue { input, hex } => dump_value(input, *hex),
        Operation::DumpFrame { input } => dump_frame(input),
    }
}
