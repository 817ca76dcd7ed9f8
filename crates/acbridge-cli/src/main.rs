//! # acbridge CLI
//!
//! Command-line utilities for inspecting and building device frames.

use acbridge_core::frame::{peek_type, TYPE_DISCOVERY_REPLY, TYPE_STATUS};
use acbridge_core::{
    decode_discovery_reply, decode_status, patch_field, FieldEncoding, PropertyDescriptor,
    PropertyRegistry, DISCOVERY_PROBE, STATUS_REQUEST,
};
use acbridge_device::{CommandDispatcher, StateSynchronizer};
use anyhow::{bail, Context, Result};
use std::env;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    let registry = load_registry()?;

    match args[1].as_str() {
        "decode" => {
            if args.len() < 3 {
                eprintln!("Usage: acbridge decode <hex>");
                std::process::exit(1);
            }
            let frame = parse_hex(&args[2])?;
            println!("{}", decode(&frame, &registry)?);
        }
        "patch" => {
            if args.len() < 5 {
                eprintln!("Usage: acbridge patch <hex> <property> <value>");
                std::process::exit(1);
            }
            let frame = parse_hex(&args[2])?;
            let patched = patch(&frame, &registry, &args[3], &args[4])?;
            println!("{}", hex::encode(patched));
        }
        "probe" => {
            println!("{}", hex::encode(DISCOVERY_PROBE));
        }
        "status-request" => {
            println!("{}", hex::encode(STATUS_REQUEST));
        }
        "fields" => {
            for descriptor in registry.iter() {
                println!("{}", describe(descriptor));
            }
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn load_registry() -> Result<PropertyRegistry> {
    match env::var("ACBRIDGE_REGISTRY_PATH") {
        Ok(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read registry file {path}"))?;
            PropertyRegistry::from_json(&json)
                .with_context(|| format!("Invalid registry file {path}"))
        }
        Err(_) => Ok(PropertyRegistry::standard()),
    }
}

/// Accepts plain hex as well as space- or colon-separated bytes.
fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(&digits).with_context(|| format!("Invalid hex: {input}"))
}

fn decode(frame: &[u8], registry: &PropertyRegistry) -> Result<String> {
    let json = match peek_type(frame) {
        Some(TYPE_DISCOVERY_REPLY) => {
            let identity = decode_discovery_reply(frame).context("Failed to decode reply")?;
            serde_json::to_string_pretty(&identity)?
        }
        Some(TYPE_STATUS) => {
            let mut properties =
                decode_status(frame, registry).context("Failed to decode status")?;
            if let Some(effective) = StateSynchronizer::effective_mode(&properties) {
                properties.insert(acbridge_core::EFFECTIVE_MODE.to_string(), effective);
            }
            serde_json::to_string_pretty(&properties)?
        }
        Some(other) => bail!("Unsupported frame type {other:#04x}"),
        None => bail!("Missing sync header"),
    };
    Ok(json)
}

fn patch(frame: &[u8], registry: &PropertyRegistry, name: &str, raw: &str) -> Result<Vec<u8>> {
    decode_status(frame, registry).context("Base frame is not a valid status frame")?;

    let descriptor = registry
        .get(name)
        .with_context(|| format!("Unknown property: {name}"))?;
    let value = CommandDispatcher::coerce(descriptor, raw)?;

    Ok(patch_field(frame, descriptor, &value)?)
}

fn describe(descriptor: &PropertyDescriptor) -> String {
    let domain = match &descriptor.encoding {
        FieldEncoding::Numeric { min, max } => format!("{min}..={max}"),
        FieldEncoding::Flag | FieldEncoding::Enumerated { .. } => descriptor.labels().join("|"),
    };
    let access = if descriptor.settable { "rw" } else { "ro" };

    format!(
        "{:<18} {:<18} byte {:>2} mask {:#04x} {access} {domain}",
        descriptor.name, descriptor.code, descriptor.offset, descriptor.mask
    )
}

fn print_help() {
    println!(
        r#"acbridge CLI

USAGE:
    acbridge <COMMAND> [OPTIONS]

COMMANDS:
    decode <hex>                      Decode a status frame or discovery reply to JSON
    patch <hex> <property> <value>    Print the status frame with one property changed
    probe                             Print the discovery probe frame
    status-request                    Print the status request frame
    fields                            List the field dictionary
    help                              Show this help message

ENVIRONMENT:
    ACBRIDGE_REGISTRY_PATH            Field dictionary JSON (default: built-in)

EXAMPLES:
    acbridge decode "aa aa 0c 03 f0 fe 6b 12 34 56 43 26 48 31 3a"
    acbridge patch <status-hex> power on
"#
    );
}
