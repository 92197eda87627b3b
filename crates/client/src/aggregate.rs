//! Folds a backend bundle into the public result shape.

use comfykit_core::{ExecuteResult, ExecuteStatus, MediaKind, RawOutputBundle};

/// Build a completed result from a backend bundle.
///
/// Media sequences are flattened across output variables in declaration
/// order; the by-variable groupings keep that same order.
pub fn completed(
    bundle: &RawOutputBundle,
    prompt_id: Option<String>,
    duration: Option<f64>,
) -> ExecuteResult {
    ExecuteResult {
        status: ExecuteStatus::Completed,
        prompt_id,
        duration,
        msg: String::new(),
        images: bundle.of_kind(MediaKind::Image),
        videos: bundle.of_kind(MediaKind::Video),
        audios: bundle.of_kind(MediaKind::Audio),
        texts: bundle.of_kind(MediaKind::Text),
        images_by_var: bundle.of_kind_by_var(MediaKind::Image),
        videos_by_var: bundle.of_kind_by_var(MediaKind::Video),
        audios_by_var: bundle.of_kind_by_var(MediaKind::Audio),
        texts_by_var: bundle.of_kind_by_var(MediaKind::Text),
        outputs: bundle.raw.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comfykit_core::Artifact;

    fn image(node: &str, name: &str) -> Artifact {
        Artifact::file(
            MediaKind::Image,
            format!("http://host/view?filename={name}"),
            Some(name.to_string()),
            node,
        )
    }

    #[test]
    fn flattens_in_variable_then_artifact_order() {
        let mut bundle = RawOutputBundle::default();
        bundle.push("a", image("9", "a0.png"));
        bundle.push("a", image("9", "a1.png"));
        bundle.push("b", image("10", "b0.png"));
        bundle.push("b", Artifact::text("caption".into(), "10"));

        let result = completed(&bundle, Some("p-1".into()), Some(1.25));
        assert_eq!(result.status, ExecuteStatus::Completed);
        assert_eq!(result.prompt_id.as_deref(), Some("p-1"));
        assert_eq!(result.duration, Some(1.25));
        assert!(result.msg.is_empty());

        let names: Vec<_> = result
            .images
            .iter()
            .map(|a| a.filename.as_deref().unwrap())
            .collect();
        assert_eq!(names, ["a0.png", "a1.png", "b0.png"]);

        let vars: Vec<_> = result.images_by_var.keys().cloned().collect();
        assert_eq!(vars, ["a", "b"]);
        assert_eq!(result.texts.len(), 1);
        assert_eq!(result.texts[0].content.as_deref(), Some("caption"));
        // Variables with no artifacts of a kind are omitted from its grouping.
        assert!(!result.texts_by_var.contains_key("a"));
    }

    #[test]
    fn empty_bundle_still_completes() {
        let result = completed(&RawOutputBundle::default(), Some("p-2".into()), Some(0.1));
        assert_eq!(result.status, ExecuteStatus::Completed);
        assert!(result.images.is_empty());
        assert!(result.outputs.is_null());
    }
}
