//! Decoded runtime call observations.
//!
//! A [`CallObservation`] is produced once per accepted wire record, consumed
//! once by the contract engine, then archived in the call log.

use serde::{Deserialize, Serialize};

use crate::id::{is_synthetic_type, MethodIdentity};

/// Parameter modifier as reported by the observed runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// Required positional.
    #[default]
    Req,
    /// Optional positional.
    Opt,
    /// Splat (`*args`).
    Rest,
    /// Required keyword.
    KeyReq,
    /// Optional keyword.
    Key,
    /// Double splat (`**opts`).
    KeyRest,
    /// Block parameter (`&blk`).
    Block,
}

/// One argument position of an observed call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArgumentInfo {
    /// Declared parameter name (may be empty when unknown).
    pub name: String,
    pub kind: ParamKind,
    /// Runtime type descriptor of the passed value.
    pub type_name: String,
}

impl ArgumentInfo {
    pub fn new(name: impl Into<String>, kind: ParamKind, type_name: impl Into<String>) -> Self {
        ArgumentInfo {
            name: name.into(),
            kind,
            type_name: type_name.into(),
        }
    }
}

/// Source location of the observed method definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSite {
    pub path: String,
    pub line: u32,
}

/// Gem (package) the observed method belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GemInfo {
    pub name: String,
    pub version: String,
}

/// One decoded runtime call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallObservation {
    pub method: MethodIdentity,
    /// Runtime type of `self` for instance calls.
    pub receiver: Option<String>,
    /// Arguments in declaration order.
    pub args: Vec<ArgumentInfo>,
    pub return_type: String,
    pub site: Option<CallSite>,
    pub gem: Option<GemInfo>,
}

impl CallObservation {
    /// Creates an observation with no receiver or provenance information.
    pub fn new(method: MethodIdentity, args: Vec<ArgumentInfo>, return_type: impl Into<String>) -> Self {
        CallObservation {
            method,
            receiver: None,
            args,
            return_type: return_type.into(),
            site: None,
            gem: None,
        }
    }

    /// Shorthand for an observation with unnamed required arguments.
    pub fn positional<I, T>(method: MethodIdentity, arg_types: I, return_type: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let args = arg_types
            .into_iter()
            .map(|t| ArgumentInfo::new("", ParamKind::Req, t))
            .collect();
        Self::new(method, args, return_type)
    }

    /// Number of argument positions.
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Argument type descriptors in position order.
    pub fn arg_types(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(|a| a.type_name.as_str())
    }

    /// True when the owner or receiver denotes a compiler-generated singleton
    /// class. Such observations carry no durable signature value.
    pub fn is_synthetic(&self) -> bool {
        self.method.is_synthetic()
            || self.receiver.as_deref().map_or(false, is_synthetic_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_builds_required_args() {
        let obs = CallObservation::positional(MethodIdentity::new("M", "m"), ["Integer", "String"], "nil");
        assert_eq!(obs.arity(), 2);
        assert_eq!(obs.arg_types().collect::<Vec<_>>(), vec!["Integer", "String"]);
        assert!(obs.args.iter().all(|a| a.kind == ParamKind::Req));
    }

    #[test]
    fn test_synthetic_receiver_detected() {
        let mut obs = CallObservation::positional(MethodIdentity::new("Foo", "m"), ["Integer"], "nil");
        assert!(!obs.is_synthetic());
        obs.receiver = Some("#<Class:Foo>".into());
        assert!(obs.is_synthetic());
    }

    #[test]
    fn test_param_kind_wire_names() {
        let kinds: Vec<ParamKind> =
            serde_json::from_str(r#"["req","opt","rest","keyreq","key","keyrest","block"]"#).unwrap();
        assert_eq!(kinds.len(), 7);
        assert_eq!(kinds[3], ParamKind::KeyReq);
        assert_eq!(serde_json::to_string(&ParamKind::KeyRest).unwrap(), "\"keyrest\"");
    }
}
