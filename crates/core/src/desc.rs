//! Field and method descriptor parsing.

use classweave_utils::errors::ClassReadError;

/// A JVM type as it appears in a descriptor.
///
/// Object types carry the internal class name (`java/lang/String`), array
/// types keep the full descriptor since their element structure is only
/// needed for printing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Object(String),
    Array(String),
}

impl JType {
    /// Number of operand-stack slots a value of this type occupies.
    pub fn slots(&self) -> u16 {
        match self {
            JType::Long | JType::Double => 2,
            _ => 1,
        }
    }

    /// The descriptor string for this type.
    pub fn descriptor(&self) -> String {
        match self {
            JType::Boolean => "Z".to_owned(),
            JType::Byte => "B".to_owned(),
            JType::Char => "C".to_owned(),
            JType::Short => "S".to_owned(),
            JType::Int => "I".to_owned(),
            JType::Long => "J".to_owned(),
            JType::Float => "F".to_owned(),
            JType::Double => "D".to_owned(),
            JType::Object(name) => format!("L{name};"),
            JType::Array(desc) => desc.clone(),
        }
    }
}

/// Parses a single field descriptor.
pub fn parse_field_descriptor(desc: &str) -> Result<JType, ClassReadError> {
    let mut chars = desc.char_indices();
    let ty = parse_type(desc, &mut chars)?;
    if chars.next().is_some() {
        return Err(ClassReadError::BadDescriptor(desc.to_owned()));
    }
    Ok(ty)
}

/// Parses a method descriptor into argument types and an optional return
/// type (`None` for `void`).
pub fn parse_method_descriptor(
    desc: &str,
) -> Result<(Vec<JType>, Option<JType>), ClassReadError> {
    let mut chars = desc.char_indices();
    match chars.next() {
        Some((_, '(')) => {}
        _ => return Err(ClassReadError::BadDescriptor(desc.to_owned())),
    }

    let mut args = Vec::new();
    loop {
        match chars.clone().next() {
            Some((_, ')')) => {
                chars.next();
                break;
            }
            Some(_) => args.push(parse_type(desc, &mut chars)?),
            None => return Err(ClassReadError::BadDescriptor(desc.to_owned())),
        }
    }

    let ret = match chars.clone().next() {
        Some((_, 'V')) => {
            chars.next();
            None
        }
        Some(_) => Some(parse_type(desc, &mut chars)?),
        None => return Err(ClassReadError::BadDescriptor(desc.to_owned())),
    };
    if chars.next().is_some() {
        return Err(ClassReadError::BadDescriptor(desc.to_owned()));
    }
    Ok((args, ret))
}

/// Total operand-stack slots occupied by a method's arguments.
pub fn argument_slots(desc: &str) -> Result<u16, ClassReadError> {
    let (args, _) = parse_method_descriptor(desc)?;
    Ok(args.iter().map(JType::slots).sum())
}

/// Operand-stack slots pushed by a method's return value (0 for void).
pub fn return_slots(desc: &str) -> Result<u16, ClassReadError> {
    let (_, ret) = parse_method_descriptor(desc)?;
    Ok(ret.as_ref().map_or(0, JType::slots))
}

fn parse_type(
    desc: &str,
    chars: &mut std::str::CharIndices<'_>,
) -> Result<JType, ClassReadError> {
    let bad = || ClassReadError::BadDescriptor(desc.to_owned());
    let (start, c) = chars.next().ok_or_else(bad)?;
    match c {
        'Z' => Ok(JType::Boolean),
        'B' => Ok(JType::Byte),
        'C' => Ok(JType::Char),
        'S' => Ok(JType::Short),
        'I' => Ok(JType::Int),
        'J' => Ok(JType::Long),
        'F' => Ok(JType::Float),
        'D' => Ok(JType::Double),
        'L' => {
            for (i, c) in chars.by_ref() {
                if c == ';' {
                    return Ok(JType::Object(desc[start + 1..i].to_owned()));
                }
            }
            Err(bad())
        }
        '[' => {
            // Consume the element type, keep the whole descriptor slice.
            let elem = parse_type(desc, chars)?;
            let end = start + 1 + elem.descriptor().len();
            Ok(JType::Array(desc[start..end].to_owned()))
        }
        _ => Err(bad()),
    }
}
