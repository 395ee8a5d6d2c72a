//! Rule-level pass over parsed stylesheets.

use super::Rewriter;
use crate::dom::{Document, DomError, RuleKind, StyleSheet};
use crate::guard::swallow;
use crate::models::{Classification, ElementKind, FONT_FACE_ATTR};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StylesheetReport {
    pub rewritten: usize,
    pub removed: usize,
    /// Sheets whose rule list could not be read (cross-origin).
    pub skipped: usize,
}

impl Rewriter {
    /// Delete blocked `@font-face` rules and re-insert style rules with
    /// local image URLs at their original index, in every readable sheet.
    pub fn rewrite_stylesheets(&self, doc: &mut Document) -> StylesheetReport {
        let mut report = StylesheetReport::default();
        for sheet in doc.style_sheets_mut() {
            let rules = match sheet.css_rules() {
                Ok(rules) => rules.to_vec(),
                Err(err) => {
                    tracing::trace!(href = ?sheet.href, "skipping stylesheet: {}", err);
                    report.skipped += 1;
                    continue;
                }
            };
            // Back to front so deletions keep earlier indices stable.
            for (index, rule) in rules.iter().enumerate().rev() {
                match rule.kind {
                    RuleKind::FontFace
                        if self
                            .rules
                            .classify(&rule.css_text, ElementKind::StyleText, FONT_FACE_ATTR)
                            == Classification::Block =>
                    {
                        if swallow("rewriter.font_face", || sheet.delete_rule(index)) {
                            report.removed += 1;
                        }
                    }
                    RuleKind::Style if self.mentions_remote_images(&rule.css_text) => {
                        let updated = self.rewrite_image_urls(&rule.css_text);
                        if updated == rule.css_text {
                            continue;
                        }
                        if swallow("rewriter.style_rule", || {
                            replace_rule(sheet, index, &updated, &rule.css_text)
                        }) {
                            report.rewritten += 1;
                        }
                    }
                    _ => {}
                }
            }
        }
        report
    }
}

fn replace_rule(
    sheet: &mut StyleSheet,
    index: usize,
    updated: &str,
    original: &str,
) -> Result<(), DomError> {
    sheet.delete_rule(index)?;
    if let Err(err) = sheet.insert_rule(updated, index) {
        sheet.insert_rule(original, index)?;
        return Err(err);
    }
    Ok(())
}
