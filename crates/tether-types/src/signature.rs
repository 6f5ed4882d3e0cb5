//! Class-signature strings reported by the foreign runtime
//!
//! When a class is first wrapped, the foreign side lists its members as
//! strings:
//!
//! - `C/<class>(<args>)` constructors
//! - `M/<name>(<args>)<ret>` instance methods, `S-M/...` static methods
//! - `F/<name>-<desc>` instance fields, `S-F/...` static fields

use thiserror::Error;

use crate::TypeTag;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("unknown member signature prefix in '{0}'")]
    UnknownPrefix(String),
    #[error("malformed member signature '{0}'")]
    Malformed(String),
    #[error("bad descriptor '{descriptor}' at offset {offset}")]
    BadDescriptor { descriptor: String, offset: usize },
}

/// One parsed member of a foreign class
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberSignature {
    Constructor {
        class_name: String,
        params: Vec<TypeTag>,
    },
    Method {
        name: String,
        params: Vec<TypeTag>,
        returns: TypeTag,
        is_static: bool,
    },
    Field {
        name: String,
        descriptor: TypeTag,
        is_static: bool,
    },
}

impl MemberSignature {
    pub fn parse(signature: &str) -> Result<MemberSignature, SignatureError> {
        let (is_static, body) = match signature.strip_prefix("S-") {
            Some(rest) => (true, rest),
            None => (false, signature),
        };

        if let Some(rest) = body.strip_prefix("F/") {
            let (name, desc) = rest
                .split_once('-')
                .ok_or_else(|| SignatureError::Malformed(signature.to_string()))?;
            if name.is_empty() {
                return Err(SignatureError::Malformed(signature.to_string()));
            }
            let mut tags = parse_descriptor_list(desc)?;
            if tags.len() != 1 {
                return Err(SignatureError::Malformed(signature.to_string()));
            }
            return Ok(MemberSignature::Field {
                name: name.to_string(),
                descriptor: tags.remove(0),
                is_static,
            });
        }

        if let Some(rest) = body.strip_prefix("M/") {
            let (name, params, tail) = split_call(rest, signature)?;
            let mut returns = parse_descriptor_list(tail)?;
            if returns.len() != 1 {
                return Err(SignatureError::Malformed(signature.to_string()));
            }
            return Ok(MemberSignature::Method {
                name: name.to_string(),
                params,
                returns: returns.remove(0),
                is_static,
            });
        }

        if let Some(rest) = body.strip_prefix("C/") {
            if is_static {
                return Err(SignatureError::Malformed(signature.to_string()));
            }
            let (class_name, params, tail) = split_call(rest, signature)?;
            if !tail.is_empty() {
                return Err(SignatureError::Malformed(signature.to_string()));
            }
            return Ok(MemberSignature::Constructor {
                class_name: class_name.to_string(),
                params,
            });
        }

        Err(SignatureError::UnknownPrefix(signature.to_string()))
    }

    /// Member name (the class name for constructors)
    pub fn name(&self) -> &str {
        match self {
            MemberSignature::Constructor { class_name, .. } => class_name,
            MemberSignature::Method { name, .. } => name,
            MemberSignature::Field { name, .. } => name,
        }
    }

    /// Full JVM method descriptor, e.g. `(ILjava/lang/String;)V`
    pub fn method_descriptor(&self) -> Option<String> {
        match self {
            MemberSignature::Method { params, returns, .. } => {
                Some(format!("({}){}", join_tags(params), returns))
            }
            MemberSignature::Constructor { params, .. } => Some(format!("({})V", join_tags(params))),
            MemberSignature::Field { .. } => None,
        }
    }
}

/// `name(args)tail` -> (name, parsed args, tail)
fn split_call<'a>(rest: &'a str, whole: &str) -> Result<(&'a str, Vec<TypeTag>, &'a str), SignatureError> {
    let open = rest
        .find('(')
        .ok_or_else(|| SignatureError::Malformed(whole.to_string()))?;
    let close = rest
        .rfind(')')
        .filter(|&close| close > open)
        .ok_or_else(|| SignatureError::Malformed(whole.to_string()))?;
    let name = &rest[..open];
    if name.is_empty() {
        return Err(SignatureError::Malformed(whole.to_string()));
    }
    let params = parse_descriptor_list(&rest[open + 1..close])?;
    Ok((name, params, &rest[close + 1..]))
}

fn join_tags(tags: &[TypeTag]) -> String {
    tags.iter().map(TypeTag::as_str).collect()
}

/// Split a run of concatenated descriptors (`IJLjava/lang/String;[D`) into tags
pub fn parse_descriptor_list(descriptors: &str) -> Result<Vec<TypeTag>, SignatureError> {
    let bytes = descriptors.as_bytes();
    let mut tags = Vec::new();
    let mut start = 0;
    let mut i = 0;

    let bad = |offset: usize| SignatureError::BadDescriptor {
        descriptor: descriptors.to_string(),
        offset,
    };

    while i < bytes.len() {
        match bytes[i] {
            b'[' => {
                i += 1;
                continue;
            }
            b'Z' | b'B' | b'C' | b'S' | b'I' | b'J' | b'F' | b'D' | b'V' => {
                // void never appears as an array element
                if bytes[i] == b'V' && i > start {
                    return Err(bad(i));
                }
                i += 1;
            }
            b'L' => {
                let end = descriptors[i..].find(';').ok_or_else(|| bad(i))?;
                if end == 1 {
                    return Err(bad(i));
                }
                i += end + 1;
            }
            _ => return Err(bad(i)),
        }
        tags.push(TypeTag::new(&descriptors[start..i]));
        start = i;
    }

    if start != bytes.len() {
        // dangling '[' prefix
        return Err(bad(start));
    }
    Ok(tags)
}

/// Parse every signature of a class, keeping the malformed ones as errors so
/// the caller can decide whether to log and skip them
pub fn parse_class_signatures<S: AsRef<str>>(
    signatures: &[S],
) -> Vec<Result<MemberSignature, SignatureError>> {
    signatures
        .iter()
        .map(|s| MemberSignature::parse(s.as_ref()))
        .collect()
}
