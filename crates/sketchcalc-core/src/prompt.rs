use crate::types::VariableAssignments;

const PREAMBLE: &str = "You are analyzing an image with mathematical expressions, equations, or graphical problems. \
Follow the PEMDAS rule (Parentheses, Exponents, Multiplication/Division, Addition/Subtraction). \
Handle exactly one of these 5 cases:";

const CASES: [&str; 5] = [
    "**Simple expressions** (e.g., 2+2, 3*4): \
     Return a JSON array of one object like [{\"expr\": \"2 + 2\", \"result\": 4}].",
    "**Set of equations** (e.g., x^2+2x+1=0, 3y+4x=0): \
     Return a JSON array of objects, one per variable, e.g. \
     [{\"expr\": \"x\", \"result\": 2, \"assign\": true}, {\"expr\": \"y\", \"result\": 5, \"assign\": true}].",
    "**Assignments** (e.g., x=4, y=5): \
     Return a JSON array of objects with \"assign\": true, e.g. \
     [{\"expr\": \"x\", \"result\": 4, \"assign\": true}].",
    "**Graphical math problems** (like drawings of cars colliding, trigonometry, Pythagorean theorem): \
     Return one JSON object with the interpretation as \"expr\" and the answer as \"result\".",
    "**Abstract concepts** (like drawings of love, hate, patriotism, historic references): \
     Return one JSON object with the explanation as \"expr\" and the abstract concept as \"result\".",
];

const RULES: [&str; 4] = [
    "Use ONLY valid JSON with double quotes.",
    "Do NOT use single quotes.",
    "Do NOT wrap the JSON in markdown (no ```json ... ```).",
    "Return ONLY a JSON array of objects.",
];

/// Marker that precedes the embedded assignments on the last prompt line.
pub const ASSIGNMENTS_MARKER: &str = "Here are the already assigned variables: ";

/// Build the instruction sent alongside the image.
///
/// Deterministic for a given mapping. The caller's prior assignments are
/// embedded as compact JSON on the final line so the model can resolve
/// variables drawn in terms of earlier ones.
pub fn build_prompt(vars: &VariableAssignments) -> String {
    let mut s = String::with_capacity(2048);
    s.push_str(PREAMBLE);
    s.push_str("\n\n");

    for (i, case) in CASES.iter().enumerate() {
        s.push_str(&format!("{}. {}\n\n", i + 1, case));
    }

    s.push_str("IMPORTANT RULES:\n");
    for rule in RULES {
        s.push_str("- ");
        s.push_str(rule);
        s.push('\n');
    }

    s.push_str("- ");
    s.push_str(ASSIGNMENTS_MARKER);
    s.push_str(&serialize_assignments(vars));
    s.push('\n');
    s
}

/// Compact JSON for the mapping. serde_json leaves non-ASCII text unescaped.
pub fn serialize_assignments(vars: &VariableAssignments) -> String {
    // A Map<String, Value> always serializes
    serde_json::to_string(vars).unwrap_or_else(|_| "{}".to_string())
}
