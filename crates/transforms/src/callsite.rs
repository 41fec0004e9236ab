//! Dynamic call-site synthesis.
//!
//! Transformers that fold work into `invokedynamic` build their call sites
//! here: constant folds through a caller-supplied bootstrap, and string
//! concatenation through `StringConcatFactory` recipes. Everything is
//! symbolic; shape matching and instruction surgery stay with the calling
//! transformer.

use serde::Deserialize;

use classweave_core::desc::JType;
use classweave_core::{CallSite, Const, Handle, HandleKind};

/// `StringConcatFactory` recipe markers (JDK `StringConcatFactory` docs):
/// `\u{1}` marks a dynamic argument, `\u{2}` a constant pulled from the
/// trailing bootstrap arguments.
const MARKER_DYNAMIC: char = '\u{1}';
const MARKER_CONSTANT: char = '\u{2}';

const SCF_OWNER: &str = "java/lang/invoke/StringConcatFactory";
const SCF_NAME: &str = "makeConcatWithConstants";
const SCF_DESCRIPTOR: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;\
Ljava/lang/invoke/MethodType;Ljava/lang/String;[Ljava/lang/Object;)\
Ljava/lang/invoke/CallSite;";

/// A static bootstrap method on a support class, with the fixed
/// `(Lookup, String, MethodType, ...) -> CallSite` linkage ABI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BootstrapSpec {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl BootstrapSpec {
    pub fn handle(&self) -> Handle {
        Handle {
            kind: HandleKind::InvokeStatic,
            owner: self.owner.clone(),
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
            interface: false,
        }
    }
}

/// A call site that resolves a chain of accessors once, at first
/// invocation, and links the result in as a constant.
///
/// `accessors` are the handles of the original access chain, passed as
/// static bootstrap arguments so the bootstrap can invoke them exactly
/// once; `result_descriptor` is the folded value's field descriptor.
pub fn fold_static_constant(
    name: &str,
    result_descriptor: &str,
    accessors: &[Handle],
    bootstrap: &BootstrapSpec,
) -> CallSite {
    CallSite {
        name: name.to_owned(),
        descriptor: format!("(){result_descriptor}"),
        bootstrap: bootstrap.handle(),
        args: accessors
            .iter()
            .map(|h| Const::MethodHandle(h.clone()))
            .collect(),
    }
}

/// One element of a concatenation, in stack order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConcatElement {
    Literal(String),
    Dynamic(JType),
}

/// An ordered concatenation recipe. Adjacent literals merge as they are
/// pushed, so a fully folded chain renders as a single literal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConcatRecipe {
    elements: Vec<ConcatElement>,
}

impl ConcatRecipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_literal(&mut self, text: &str) {
        if let Some(ConcatElement::Literal(last)) = self.elements.last_mut() {
            last.push_str(text);
        } else {
            self.elements.push(ConcatElement::Literal(text.to_owned()));
        }
    }

    pub fn push_dynamic(&mut self, ty: JType) {
        self.elements.push(ConcatElement::Dynamic(ty));
    }

    pub fn elements(&self) -> &[ConcatElement] {
        &self.elements
    }

    pub fn dynamic_count(&self) -> usize {
        self.elements
            .iter()
            .filter(|e| matches!(e, ConcatElement::Dynamic(_)))
            .count()
    }

    /// Renders the `makeConcatWithConstants` call site: template with
    /// `\u{1}` per dynamic argument, literals inline unless they contain a
    /// marker character, in which case they are escaped to `\u{2}` and
    /// passed as trailing constants.
    pub fn into_call_site(self) -> CallSite {
        let mut template = String::new();
        let mut constants = Vec::new();
        let mut params = String::from("(");
        for element in &self.elements {
            match element {
                ConcatElement::Literal(text) => {
                    if text.contains(MARKER_DYNAMIC) || text.contains(MARKER_CONSTANT) {
                        template.push(MARKER_CONSTANT);
                        constants.push(Const::Str(text.clone()));
                    } else {
                        template.push_str(text);
                    }
                }
                ConcatElement::Dynamic(ty) => {
                    template.push(MARKER_DYNAMIC);
                    params.push_str(&ty.descriptor());
                }
            }
        }
        params.push_str(")Ljava/lang/String;");

        let mut args = vec![Const::Str(template)];
        args.extend(constants);
        CallSite {
            name: SCF_NAME.to_owned(),
            descriptor: params,
            bootstrap: Handle {
                kind: HandleKind::InvokeStatic,
                owner: SCF_OWNER.to_owned(),
                name: SCF_NAME.to_owned(),
                descriptor: SCF_DESCRIPTOR.to_owned(),
                interface: false,
            },
            args,
        }
    }

    /// Reference evaluator mirroring what the linked concatenation would
    /// produce at runtime. Exists for tests and literal folding, not as an
    /// interpreter; `None` on arity mismatch.
    pub fn evaluate(&self, values: &[ConcatValue]) -> Option<String> {
        if values.len() != self.dynamic_count() {
            return None;
        }
        let mut out = String::new();
        let mut next = values.iter();
        for element in &self.elements {
            match element {
                ConcatElement::Literal(text) => out.push_str(text),
                ConcatElement::Dynamic(_) => out.push_str(&next.next()?.to_java_string()),
            }
        }
        Some(out)
    }
}

/// A runtime value for the reference evaluator. `byte` and `short`
/// arguments widen to `Int`, as they do on the operand stack.
#[derive(Debug, Clone, PartialEq)]
pub enum ConcatValue {
    Boolean(bool),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
}

impl ConcatValue {
    /// Java's default stringification of this value.
    pub fn to_java_string(&self) -> String {
        match self {
            ConcatValue::Boolean(v) => if *v { "true" } else { "false" }.to_owned(),
            ConcatValue::Char(unit) => char::from_u32(u32::from(*unit))
                .unwrap_or(char::REPLACEMENT_CHARACTER)
                .to_string(),
            ConcatValue::Int(v) => v.to_string(),
            ConcatValue::Long(v) => v.to_string(),
            ConcatValue::Float(v) => jvm_float_to_string(*v),
            ConcatValue::Double(v) => jvm_double_to_string(*v),
            ConcatValue::Str(s) => s.clone(),
        }
    }
}

/// `Float.toString` semantics: shortest uniquely-identifying digits,
/// always a fraction part, scientific notation outside `[1e-3, 1e7)`.
pub fn jvm_float_to_string(value: f32) -> String {
    if value.is_nan() {
        return "NaN".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_owned();
    }
    let abs = value.abs();
    if (1e-3f32..1e7f32).contains(&abs) {
        decimal_form(format!("{value}"))
    } else {
        scientific_form(format!("{value:e}"))
    }
}

/// `Double.toString` semantics, same notation switch as `Float.toString`.
pub fn jvm_double_to_string(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_owned();
    }
    let abs = value.abs();
    if (1e-3..1e7).contains(&abs) {
        decimal_form(format!("{value}"))
    } else {
        scientific_form(format!("{value:e}"))
    }
}

fn decimal_form(mut rendered: String) -> String {
    if !rendered.contains('.') {
        rendered.push_str(".0");
    }
    rendered
}

fn scientific_form(rendered: String) -> String {
    // Rust renders `1e7`; Java wants `1.0E7`.
    match rendered.split_once('e') {
        Some((mantissa, exponent)) => {
            let mantissa = decimal_form(mantissa.to_owned());
            format!("{mantissa}E{exponent}")
        }
        None => rendered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_markers() {
        let mut recipe = ConcatRecipe::new();
        recipe.push_literal("x");
        recipe.push_dynamic(JType::Int);
        recipe.push_dynamic(JType::Boolean);
        let site = recipe.into_call_site();
        assert_eq!(site.name, "makeConcatWithConstants");
        assert_eq!(site.descriptor, "(IZ)Ljava/lang/String;");
        assert_eq!(site.args, vec![Const::Str("x\u{1}\u{1}".to_owned())]);
    }

    #[test]
    fn literal_containing_marker_is_escaped() {
        let mut recipe = ConcatRecipe::new();
        recipe.push_literal("a\u{1}b");
        recipe.push_dynamic(JType::Object("java/lang/String".to_owned()));
        let site = recipe.into_call_site();
        assert_eq!(
            site.args,
            vec![
                Const::Str("\u{2}\u{1}".to_owned()),
                Const::Str("a\u{1}b".to_owned()),
            ]
        );
    }

    #[test]
    fn adjacent_literals_merge() {
        let mut recipe = ConcatRecipe::new();
        recipe.push_literal("a");
        recipe.push_literal("b");
        assert_eq!(
            recipe.elements(),
            &[ConcatElement::Literal("ab".to_owned())]
        );
    }

    #[test]
    fn evaluator_matches_java_defaults() {
        let mut recipe = ConcatRecipe::new();
        recipe.push_literal("x");
        recipe.push_dynamic(JType::Int);
        recipe.push_dynamic(JType::Boolean);
        assert_eq!(
            recipe.evaluate(&[ConcatValue::Int(42), ConcatValue::Boolean(true)]),
            Some("x42true".to_owned())
        );
    }

    #[test]
    fn evaluator_boundary_values() {
        let cases: Vec<(ConcatValue, &str)> = vec![
            (ConcatValue::Int(0), "0"),
            (ConcatValue::Int(-1), "-1"),
            (ConcatValue::Int(i32::MIN), "-2147483648"),
            (ConcatValue::Boolean(false), "false"),
            (ConcatValue::Char(0), "\u{0}"),
            (ConcatValue::Str(String::new()), ""),
            (ConcatValue::Long(i64::MIN), "-9223372036854775808"),
        ];
        for (value, expected) in cases {
            assert_eq!(value.to_java_string(), expected);
        }
    }

    #[test]
    fn evaluator_arity_mismatch_declines() {
        let mut recipe = ConcatRecipe::new();
        recipe.push_dynamic(JType::Int);
        assert_eq!(recipe.evaluate(&[]), None);
    }

    #[test]
    fn java_double_rendering() {
        assert_eq!(jvm_double_to_string(3.0), "3.0");
        assert_eq!(jvm_double_to_string(-0.0), "-0.0");
        assert_eq!(jvm_double_to_string(0.001), "0.001");
        assert_eq!(jvm_double_to_string(1e7), "1.0E7");
        assert_eq!(jvm_double_to_string(1.0e-4), "1.0E-4");
        assert_eq!(jvm_double_to_string(f64::NAN), "NaN");
        assert_eq!(jvm_double_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(jvm_float_to_string(1.5), "1.5");
    }
}
