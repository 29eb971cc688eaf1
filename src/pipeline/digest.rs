use super::step::StepKind;

/// Reduces a step's raw output to a bounded summary used as forward
/// context. Must be deterministic for a given input and never exceed
/// `max_len` bytes, no matter how large the raw output is.
pub trait StepDigester: Send + Sync {
    fn max_len(&self) -> usize;
    fn digest(&self, raw: &str, kind: StepKind) -> String;
}

/// Default digester: a short structural summary per step kind rather than
/// a raw-text prefix.
pub struct StructuralDigester {
    max_len: usize,
}

impl StructuralDigester {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(16),
        }
    }

    fn digest_template(raw: &str) -> String {
        let mut names: Vec<&str> = Vec::new();
        let mut types: Vec<&str> = Vec::new();
        let mut in_resources = false;
        for line in raw.lines() {
            let trimmed = line.trim();
            if trimmed == "Resources:" {
                in_resources = true;
                continue;
            }
            if in_resources && !line.starts_with(' ') && !trimmed.is_empty() {
                in_resources = false;
            }
            if let Some(value) = trimmed.strip_prefix("Type:") {
                let value = value.trim();
                if !value.is_empty() && !types.contains(&value) {
                    types.push(value);
                }
            }
            // Resource logical ids sit at single-indent depth under the
            // Resources block.
            if in_resources
                && line.starts_with("  ")
                && !line.starts_with("   ")
                && trimmed.ends_with(':')
            {
                let name = trimmed.trim_end_matches(':');
                if !name.is_empty() && !names.contains(&name) {
                    names.push(name);
                }
            }
        }

        let mut sections = Vec::new();
        if !names.is_empty() {
            sections.push(format!("Resources: {}", names.join(", ")));
        }
        if !types.is_empty() {
            types.truncate(10);
            sections.push(format!("Resource types: {}", types.join(", ")));
        }
        sections.push(format!(
            "Overview: {}",
            raw.chars().take(200).collect::<String>().replace('\n', " ")
        ));
        sections.join("\n")
    }

    fn digest_diagram(raw: &str) -> String {
        let mut components: Vec<String> = Vec::new();
        let mut edges = 0usize;
        for line in raw.lines() {
            if line.contains("->") || line.contains("-->") {
                edges += 1;
            }
            // Bracketed tokens are node labels in the diagram notations the
            // agents emit.
            let mut rest = line;
            while let Some(start) = rest.find('[') {
                let tail = &rest[start + 1..];
                let Some(end) = tail.find(']') else { break };
                let label = tail[..end].trim();
                if !label.is_empty() && !components.iter().any(|c| c == label) {
                    components.push(label.to_string());
                }
                rest = &tail[end + 1..];
            }
        }

        let mut sections = Vec::new();
        if !components.is_empty() {
            components.truncate(12);
            sections.push(format!("Components: {}", components.join(", ")));
        }
        sections.push(format!("Contains {edges} connections"));
        sections.join("\n")
    }

    fn digest_cost(raw: &str) -> String {
        let figures: Vec<&str> = raw
            .lines()
            .map(str::trim)
            .filter(|line| line.contains('$'))
            .take(8)
            .collect();
        if figures.is_empty() {
            format!(
                "Cost notes: {}",
                raw.chars().take(200).collect::<String>().replace('\n', " ")
            )
        } else {
            format!("Cost figures:\n{}", figures.join("\n"))
        }
    }
}

impl Default for StructuralDigester {
    fn default() -> Self {
        Self::new(600)
    }
}

impl StepDigester for StructuralDigester {
    fn max_len(&self) -> usize {
        self.max_len
    }

    fn digest(&self, raw: &str, kind: StepKind) -> String {
        let summary = match kind {
            StepKind::Template => Self::digest_template(raw),
            StepKind::Diagram => Self::digest_diagram(raw),
            StepKind::Cost => Self::digest_cost(raw),
        };
        truncate_at_char_boundary(summary, self.max_len)
    }
}

fn truncate_at_char_boundary(mut s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut cut = max;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_digest_extracts_structure() {
        let raw = "AWSTemplateFormatVersion: '2010-09-09'\nResources:\n  WebBucket:\n    Type: AWS::S3::Bucket\n  ApiFn:\n    Type: AWS::Lambda::Function\n";
        let digester = StructuralDigester::default();
        let digest = digester.digest(raw, StepKind::Template);
        assert!(digest.contains("WebBucket"));
        assert!(digest.contains("AWS::Lambda::Function"));
    }

    #[test]
    fn digest_is_bounded_for_huge_input() {
        let raw = "Type: AWS::EC2::Instance\n".repeat(50_000);
        let digester = StructuralDigester::new(256);
        for kind in StepKind::ORDERED {
            let digest = digester.digest(&raw, kind);
            assert!(digest.len() <= 256, "{kind:?} digest exceeded bound");
        }
    }

    #[test]
    fn digest_is_deterministic() {
        let raw = "Components here\nA[Gateway] --> B[Store]\n";
        let digester = StructuralDigester::default();
        assert_eq!(
            digester.digest(raw, StepKind::Diagram),
            digester.digest(raw, StepKind::Diagram)
        );
    }

    #[test]
    fn cost_digest_collects_figures() {
        let raw = "Total: $120/month\nCompute: $80\nStorage: $40\nNotes follow";
        let digester = StructuralDigester::default();
        let digest = digester.digest(raw, StepKind::Cost);
        assert!(digest.contains("$120/month"));
        assert!(!digest.contains("Notes follow"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let raw = "é".repeat(400);
        let digester = StructuralDigester::new(101);
        let digest = digester.digest(&raw, StepKind::Cost);
        assert!(digest.len() <= 101);
        assert!(digest.chars().count() > 0);
    }
}
