use vimini_genai::ModelInfo;

/// One line per model, `name` without the `models/` prefix, sorted, with the
/// display name when the API sent one.
pub fn model_lines(models: &[ModelInfo]) -> Vec<String> {
  let mut lines: Vec<String> = models
    .iter()
    .map(|model| {
      let name = model.name.strip_prefix("models/").unwrap_or(&model.name);
      match model.display_name.as_deref() {
        Some(display) if !display.is_empty() && display != name => format!("{name} ({display})"),
        _ => name.to_string(),
      }
    })
    .collect();
  lines.sort();
  lines.dedup();
  lines
}
