//! CLI for doppel mock contracts.
//!
//! Inspects an ABI the way the stub builder sees it: which selector keys
//! exist, what exact key a `withArgs` call produces, and what a revert
//! payload says.

use alloy_dyn_abi::{DynSolType, DynSolValue, Specifier};
use alloy_json_abi::{Function, JsonAbi};
use alloy_primitives::Bytes;
use clap::{Parser, Subcommand};
use doppel_client::codec::{encode_call, find_function, parse_abi};
use doppel_core::{decode_revert_reason, CallKey, DoppelError, DoppelResult};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "doppel", version, about = "Mock contract stub inspector")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List every stubbable function with its selector key.
    Selectors {
        /// JSON ABI, build artifact, or human-readable signatures.
        #[arg(short, long, env = "DOPPEL_ABI")]
        abi: PathBuf,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the stub key for a function, exact when arguments are given.
    Key {
        #[arg(short, long, env = "DOPPEL_ABI")]
        abi: PathBuf,

        /// Bare name or full signature, e.g. `add(uint256)`.
        function: String,

        /// Arguments in their human-readable form.
        args: Vec<String>,
    },
    /// Decode revert data into its reason string.
    DecodeRevert {
        /// Hex payload, with or without `0x`.
        data: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Selectors { abi, json } => {
            let abi = load_abi(&abi)?;
            let rows = selector_rows(&abi);
            tracing::info!(functions = rows.len(), "loaded abi");

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for row in &rows {
                    let note = if row["void"] == serde_json::Value::Bool(true) {
                        "  (void: reverts only)"
                    } else {
                        ""
                    };
                    println!(
                        "{}  {}{note}",
                        row["selector"].as_str().unwrap_or_default(),
                        row["signature"].as_str().unwrap_or_default()
                    );
                }
            }
        }
        Commands::Key { abi, function, args } => {
            let abi = load_abi(&abi)?;
            let f = find_function(&abi, &function)?;
            let key = stub_key(f, &args)?;
            let kind = if key.is_exact() { "exact" } else { "selector" };
            tracing::info!(function = %f.signature(), kind, "computed key");
            println!("{}", key.to_bytes());
        }
        Commands::DecodeRevert { data } => {
            let raw = hex::decode(data.trim().trim_start_matches("0x"))?;
            println!("{}", describe_revert(&raw));
        }
    }

    Ok(())
}

fn load_abi(path: &Path) -> DoppelResult<JsonAbi> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| DoppelError::InvalidInput(format!("cannot read {}: {e}", path.display())))?;
    parse_abi(&source)
}

fn selector_rows(abi: &JsonAbi) -> Vec<serde_json::Value> {
    abi.functions()
        .map(|f| {
            serde_json::json!({
                "signature": f.signature(),
                "selector": f.selector().to_string(),
                "outputs": f.outputs.len(),
                "void": f.outputs.is_empty(),
            })
        })
        .collect()
}

/// Selector key without arguments, exact key with them.
fn stub_key(function: &Function, args: &[String]) -> DoppelResult<CallKey> {
    if args.is_empty() {
        return Ok(CallKey::Selector(function.selector()));
    }
    if args.len() != function.inputs.len() {
        return Err(DoppelError::InvalidInput(format!(
            "{} takes {} arguments, got {}",
            function.signature(),
            function.inputs.len(),
            args.len()
        )));
    }

    let values = function
        .inputs
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            let ty: DynSolType = param
                .resolve()
                .map_err(|e| DoppelError::Abi(format!("unsupported type {}: {e}", param.ty)))?;
            ty.coerce_str(arg)
                .map_err(|e| DoppelError::InvalidInput(format!("bad {} argument {arg:?}: {e}", param.ty)))
        })
        .collect::<DoppelResult<Vec<DynSolValue>>>()?;

    let data: Bytes = encode_call(function, &values)?;
    Ok(CallKey::from_raw(&data))
}

fn describe_revert(data: &[u8]) -> String {
    if data.is_empty() {
        return "empty revert data (no reason)".to_string();
    }
    match decode_revert_reason(data) {
        Some(reason) => format!("Error({reason:?})"),
        None => format!("raw revert data ({} bytes)", data.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doppel_core::{encode_revert, NOT_INITIALIZED};

    const ABI: &str = r#"
        function add(uint256 value) returns (uint256)
        function poke()
    "#;

    #[test]
    fn no_args_gives_selector_key() {
        let abi = parse_abi(ABI).unwrap();
        let key = stub_key(find_function(&abi, "add").unwrap(), &[]).unwrap();
        assert_eq!(key.to_bytes().to_string(), "0x1003e2d2");
    }

    #[test]
    fn args_give_exact_key() {
        let abi = parse_abi(ABI).unwrap();
        let key = stub_key(find_function(&abi, "add").unwrap(), &["5".to_string()]).unwrap();
        assert!(key.is_exact());
        assert_eq!(key.to_bytes().len(), 36);
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let abi = parse_abi(ABI).unwrap();
        let err = stub_key(find_function(&abi, "poke").unwrap(), &["1".to_string()]).unwrap_err();
        assert!(matches!(err, DoppelError::InvalidInput(_)));
    }

    #[test]
    fn void_functions_are_flagged() {
        let abi = parse_abi(ABI).unwrap();
        let rows = selector_rows(&abi);
        let poke = rows.iter().find(|r| r["signature"] == "poke()").unwrap();
        assert_eq!(poke["void"], true);
    }

    #[test]
    fn revert_descriptions() {
        assert_eq!(
            describe_revert(&encode_revert(NOT_INITIALIZED)),
            format!("Error({NOT_INITIALIZED:?})")
        );
        assert_eq!(describe_revert(&encode_revert("")), "Error(\"\")");
        assert_eq!(describe_revert(&[]), "empty revert data (no reason)");
        assert_eq!(describe_revert(&[0xde, 0xad]), "raw revert data (2 bytes)");
    }
}
