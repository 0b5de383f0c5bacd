use anyhow::{Context, Result};
use tracing::info;

use crate::{
    agent::VisionBackend,
    normalize::normalize_reply,
    prompt::build_prompt,
    types::{Image, ResultRecord, VariableAssignments},
};

/// Ask `backend` to read the sketch in `image` and return normalized results.
///
/// `vars` are the caller's earlier assignments; `None` is the same as an empty
/// mapping. Only a failed backend call is an error. A reply that cannot be
/// parsed yields an empty list.
pub async fn analyze_image(
    backend: &dyn VisionBackend,
    image: &Image,
    vars: Option<&VariableAssignments>,
) -> Result<Vec<ResultRecord>> {
    let empty = VariableAssignments::new();
    let vars = vars.unwrap_or(&empty);
    let prompt = build_prompt(vars);

    info!(
        backend = backend.name(),
        image_bytes = image.bytes.len(),
        mime_type = %image.mime_type,
        known_vars = vars.len(),
        "analyzing image"
    );

    let reply = backend
        .generate(&prompt, image)
        .await
        .with_context(|| format!("{} backend call failed", backend.name()))?;

    Ok(normalize_reply(&reply))
}

/// Fold `assign: true` records into `vars` as `expr → result`, the way a
/// client keeps state between requests. Records without a usable `expr` or
/// `result` are skipped. Returns how many bindings were written.
pub fn remember_assignments(vars: &mut VariableAssignments, records: &[ResultRecord]) -> usize {
    let mut n = 0;
    for r in records.iter().filter(|r| r.assign) {
        let (Some(name), Some(value)) = (r.expr_text(), r.result.clone()) else {
            continue;
        };
        vars.insert(name, value);
        n += 1;
    }
    n
}
