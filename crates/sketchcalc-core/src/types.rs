use serde::Serialize;
use serde_json::{Map, Value};

// ── Inputs ───────────────────────────────────────────────────────────────

/// Variables the caller has already bound, name → value.
///
/// Insertion order is preserved so the prompt shows them as the caller sent them.
pub type VariableAssignments = Map<String, Value>;

/// An already-decoded image handed to a vision backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub bytes: Vec<u8>,
    /// e.g. `image/png`
    pub mime_type: String,
}

impl Image {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn png(bytes: Vec<u8>) -> Self {
        Self::new(bytes, "image/png")
    }
}

// ── Results ──────────────────────────────────────────────────────────────

/// One answer unit returned to the caller.
///
/// `expr` and `result` are passed through exactly as the model produced them
/// and stay absent when the model left them out. `assign` is always present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expr: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub assign: bool,
    /// Any other keys the model emitted, untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResultRecord {
    pub fn new(expr: impl Into<Value>, result: impl Into<Value>, assign: bool) -> Self {
        Self {
            expr: Some(expr.into()),
            result: Some(result.into()),
            assign,
            extra: Map::new(),
        }
    }

    /// Split a parsed object into the known fields and the rest.
    /// `assign` is filled in by the caller after coercion.
    pub(crate) fn from_object(mut obj: Map<String, Value>, assign: bool) -> Self {
        let expr = obj.remove("expr");
        let result = obj.remove("result");
        obj.remove("assign");
        Self {
            expr,
            result,
            assign,
            extra: obj,
        }
    }

    /// The expression as plain text: strings verbatim, anything else as JSON.
    pub fn expr_text(&self) -> Option<String> {
        match self.expr.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

// ── Parse outcome ────────────────────────────────────────────────────────

/// Why one parse strategy rejected a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub strategy: &'static str,
    pub reason: String,
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.strategy, self.reason)
    }
}

/// What the normalizer made of a raw model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(Vec<ResultRecord>),
    /// Every strategy failed; one entry per strategy, in the order tried.
    Unparseable(Vec<ParseFailure>),
}

impl ParseOutcome {
    /// Collapse to a record list, degrading `Unparseable` to empty.
    pub fn into_records(self) -> Vec<ResultRecord> {
        match self {
            Self::Parsed(records) => records,
            Self::Unparseable(_) => Vec::new(),
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }
}
