//! Declarative schema validation with capture slots.
//!
//! A [`Validator`] mirrors the expected ASN.1 shape; fields left unset match
//! anything. Validation walks the node tree in order, skipping optional
//! schema children that fail to match, and copies matched payloads into a
//! [`Captures`] map under caller-chosen keys. This is how the PKI layer
//! destructures certificates and keys without hand-written traversal.

use super::{Asn1, Content, TagClass};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Validator {
    /// Name used in error messages, e.g. `"tbsCertificate.serialNumber"`.
    pub name: &'static str,
    pub class: Option<TagClass>,
    pub tag: Option<u32>,
    pub constructed: Option<bool>,
    /// Expected primitive payload, matched byte-for-byte.
    pub primitive_value: Option<Vec<u8>>,
    pub optional: bool,
    pub children: Vec<Validator>,
    pub capture: Option<&'static str>,
    pub capture_asn1: Option<&'static str>,
    pub capture_bit_string_contents: Option<&'static str>,
    pub capture_bit_string_value: Option<&'static str>,
}

impl Validator {
    pub fn node(name: &'static str) -> Validator {
        Validator { name, ..Validator::default() }
    }

    pub fn universal(mut self, tag: u32) -> Self {
        self.class = Some(TagClass::Universal);
        self.tag = Some(tag);
        self
    }

    pub fn context(mut self, tag: u32) -> Self {
        self.class = Some(TagClass::ContextSpecific);
        self.tag = Some(tag);
        self
    }

    pub fn constructed(mut self, c: bool) -> Self {
        self.constructed = Some(c);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn value(mut self, bytes: &[u8]) -> Self {
        self.primitive_value = Some(bytes.to_vec());
        self
    }

    pub fn children(mut self, children: Vec<Validator>) -> Self {
        self.children = children;
        self
    }

    pub fn capture(mut self, key: &'static str) -> Self {
        self.capture = Some(key);
        self
    }

    pub fn capture_asn1(mut self, key: &'static str) -> Self {
        self.capture_asn1 = Some(key);
        self
    }

    pub fn capture_bit_string_contents(mut self, key: &'static str) -> Self {
        self.capture_bit_string_contents = Some(key);
        self
    }

    pub fn capture_bit_string_value(mut self, key: &'static str) -> Self {
        self.capture_bit_string_value = Some(key);
        self
    }
}

#[derive(Debug, Clone)]
pub enum CaptureValue {
    Bytes(Vec<u8>),
    Node(Asn1),
}

#[derive(Debug, Clone, Default)]
pub struct Captures {
    map: HashMap<&'static str, CaptureValue>,
}

impl Captures {
    pub fn new() -> Self {
        Captures::default()
    }

    pub fn bytes(&self, key: &str) -> Option<&[u8]> {
        match self.map.get(key) {
            Some(CaptureValue::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    pub fn node(&self, key: &str) -> Option<&Asn1> {
        match self.map.get(key) {
            Some(CaptureValue::Node(n)) => Some(n),
            _ => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    fn put_bytes(&mut self, key: &'static str, bytes: Vec<u8>) {
        self.map.insert(key, CaptureValue::Bytes(bytes));
    }

    fn put_node(&mut self, key: &'static str, node: Asn1) {
        self.map.insert(key, CaptureValue::Node(node));
    }
}

/// Returns true when every non-optional schema node matched. Mismatch
/// details are appended to `errors` when supplied.
pub fn validate(
    node: &Asn1,
    v: &Validator,
    captures: &mut Captures,
    errors: Option<&mut Vec<String>>,
) -> bool {
    let mut sink = errors;
    validate_inner(node, v, captures, &mut sink)
}

fn validate_inner(
    node: &Asn1,
    v: &Validator,
    captures: &mut Captures,
    errors: &mut Option<&mut Vec<String>>,
) -> bool {
    if let Some(class) = v.class {
        if class != node.class {
            push_error(errors, v, &format!("tag class {:?}, got {:?}", class, node.class));
            return false;
        }
    }
    if let Some(tag) = v.tag {
        if tag != node.tag {
            push_error(errors, v, &format!("tag {}, got {}", tag, node.tag));
            return false;
        }
    }
    if let Some(constructed) = v.constructed {
        if constructed != node.constructed {
            push_error(
                errors,
                v,
                &format!("constructed={}, got constructed={}", constructed, node.constructed),
            );
            return false;
        }
    }
    if let Some(expected) = &v.primitive_value {
        match &node.content {
            Content::Bytes(actual) if actual == expected => {}
            _ => {
                push_error(errors, v, "a specific primitive value");
                return false;
            }
        }
    }

    if !v.children.is_empty() {
        let kids: &[Asn1] = match &node.content {
            Content::Children(kids) => kids,
            Content::Bytes(_) => {
                push_error(errors, v, "child values, got a primitive");
                return false;
            }
        };
        let mut j = 0;
        for child_v in &v.children {
            let matched = match kids.get(j) {
                Some(child) => {
                    // Optional children that fail are skipped without
                    // advancing; their mismatch is not an error.
                    let mut quiet = None;
                    let sink = if child_v.optional { &mut quiet } else { &mut *errors };
                    let ok = validate_inner(child, child_v, captures, sink);
                    if ok {
                        j += 1;
                    }
                    ok || child_v.optional
                }
                None => child_v.optional,
            };
            if !matched {
                if kids.get(j).is_none() {
                    push_error(errors, v, &format!("child \"{}\" to be present", child_v.name));
                }
                return false;
            }
        }
    }

    run_captures(node, v, captures, errors)
}

fn run_captures(
    node: &Asn1,
    v: &Validator,
    captures: &mut Captures,
    errors: &mut Option<&mut Vec<String>>,
) -> bool {
    if let Some(key) = v.capture {
        match &node.content {
            Content::Bytes(b) => captures.put_bytes(key, b.clone()),
            Content::Children(_) => captures.put_node(key, node.clone()),
        }
    }
    if let Some(key) = v.capture_asn1 {
        captures.put_node(key, node.clone());
    }
    if let Some(key) = v.capture_bit_string_contents {
        match &node.bit_string_contents {
            Some(contents) => captures.put_bytes(key, contents.clone()),
            None => {
                push_error(errors, v, "a parsed BIT STRING with preserved contents");
                return false;
            }
        }
    }
    if let Some(key) = v.capture_bit_string_value {
        let contents = match (&node.bit_string_contents, &node.content) {
            (Some(contents), _) => contents.as_slice(),
            (None, Content::Bytes(b)) => b.as_slice(),
            _ => {
                push_error(errors, v, "a primitive BIT STRING");
                return false;
            }
        };
        match contents.split_first() {
            None => captures.put_bytes(key, Vec::new()),
            Some((0, rest)) => captures.put_bytes(key, rest.to_vec()),
            // Unused bits are not supported by the capture interface.
            Some((_, _)) => {
                push_error(errors, v, "a BIT STRING with zero unused bits");
                return false;
            }
        }
    }
    true
}

fn push_error(errors: &mut Option<&mut Vec<String>>, v: &Validator, expectation: &str) {
    if let Some(errors) = errors {
        errors.push(format!("[{}] Expected {}", v.name, expectation));
    }
}
