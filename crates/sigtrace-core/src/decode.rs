//! Record decoder: one JSON wire line into a [`CallObservation`].
//!
//! Decoding never looks at the synthetic-receiver rule; a synthetic record
//! decodes successfully and is filtered by the caller via
//! [`CallObservation::is_synthetic`].

use serde::Deserialize;

use crate::error::CoreError;
use crate::id::MethodIdentity;
use crate::observation::{ArgumentInfo, CallObservation, CallSite, GemInfo, ParamKind};

#[derive(Debug, Deserialize)]
struct WireArg {
    #[serde(default)]
    name: String,
    #[serde(default)]
    kind: ParamKind,
    #[serde(rename = "type")]
    type_name: String,
}

#[derive(Debug, Deserialize)]
struct WireRecord {
    receiver_name: String,
    method_name: String,
    #[serde(default)]
    receiver_type: Option<String>,
    #[serde(default)]
    args: Vec<WireArg>,
    return_type_name: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    lineno: Option<u32>,
    #[serde(default)]
    gem_name: Option<String>,
    #[serde(default)]
    gem_version: Option<String>,
}

fn required(field: &str, value: String) -> Result<String, CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::MalformedRecord {
            reason: format!("'{}' is blank", field),
        });
    }
    Ok(trimmed.to_string())
}

/// Parses one raw record line.
pub fn decode_record(line: &str) -> Result<CallObservation, CoreError> {
    let wire: WireRecord = serde_json::from_str(line.trim_end_matches(['\r', '\n']))?;

    let owner = required("receiver_name", wire.receiver_name)?;
    let name = required("method_name", wire.method_name)?;
    let return_type = required("return_type_name", wire.return_type_name)?;

    let args = wire
        .args
        .into_iter()
        .enumerate()
        .map(|(i, arg)| {
            let type_name = required(&format!("args[{}].type", i), arg.type_name)?;
            Ok(ArgumentInfo::new(arg.name, arg.kind, type_name))
        })
        .collect::<Result<Vec<_>, CoreError>>()?;

    let site = match (wire.path, wire.lineno) {
        (Some(path), Some(line)) if !path.is_empty() => Some(CallSite { path, line }),
        _ => None,
    };
    let gem = match (wire.gem_name, wire.gem_version) {
        (Some(name), Some(version)) if !name.is_empty() => Some(GemInfo { name, version }),
        _ => None,
    };

    Ok(CallObservation {
        method: MethodIdentity::new(owner, name),
        receiver: wire.receiver_type.filter(|r| !r.trim().is_empty()),
        args,
        return_type,
        site,
        gem,
    })
}
