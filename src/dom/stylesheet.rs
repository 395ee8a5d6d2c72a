//! Parsed stylesheets and their rule lists.

use crate::dom::{DomError, NodeId};
use cssparser::{ParseError, Parser, ParserInput, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Style,
    FontFace,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssRule {
    pub kind: RuleKind,
    pub css_text: String,
}

impl CssRule {
    fn from_text(text: &str) -> Self {
        let css_text = text.trim().to_string();
        let kind = rule_kind(&css_text);
        Self { kind, css_text }
    }
}

fn rule_kind(text: &str) -> RuleKind {
    let mut input = ParserInput::new(text);
    let mut parser = Parser::new(&mut input);
    match parser.next() {
        Ok(Token::AtKeyword(name)) if name.eq_ignore_ascii_case("font-face") => RuleKind::FontFace,
        Ok(Token::AtKeyword(_)) => RuleKind::Other,
        _ => RuleKind::Style,
    }
}

#[derive(Debug, Clone)]
pub struct StyleSheet {
    /// `<style>` element that owns the sheet, if any.
    pub owner: Option<NodeId>,
    pub href: Option<String>,
    cross_origin: bool,
    rules: Vec<CssRule>,
}

impl StyleSheet {
    pub fn from_text(owner: Option<NodeId>, text: &str) -> Self {
        Self {
            owner,
            href: None,
            cross_origin: false,
            rules: split_rules(text),
        }
    }

    /// Sheet loaded from `href`; cross-origin sheets hide their rules.
    pub fn external(href: &str, text: &str, cross_origin: bool) -> Self {
        Self {
            owner: None,
            href: Some(href.to_string()),
            cross_origin,
            rules: split_rules(text),
        }
    }

    pub fn css_rules(&self) -> Result<&[CssRule], DomError> {
        if self.cross_origin {
            return Err(DomError::Security);
        }
        Ok(&self.rules)
    }

    pub fn delete_rule(&mut self, index: usize) -> Result<(), DomError> {
        if self.cross_origin {
            return Err(DomError::Security);
        }
        if index >= self.rules.len() {
            return Err(DomError::IndexSize(index));
        }
        self.rules.remove(index);
        Ok(())
    }

    pub fn insert_rule(&mut self, text: &str, index: usize) -> Result<usize, DomError> {
        if self.cross_origin {
            return Err(DomError::Security);
        }
        if index > self.rules.len() {
            return Err(DomError::IndexSize(index));
        }
        let mut parsed = split_rules(text);
        if parsed.len() != 1 {
            return Err(DomError::Syntax(text.to_string()));
        }
        self.rules.insert(index, parsed.remove(0));
        Ok(index)
    }
}

/// Split stylesheet text into top-level rules. A rule ends with its
/// outermost `{}` block, or with `;` for block-less at-rules.
pub fn split_rules(text: &str) -> Vec<CssRule> {
    let mut input = ParserInput::new(text);
    let mut parser = Parser::new(&mut input);
    let mut rules = Vec::new();

    loop {
        parser.skip_whitespace();
        if parser.is_exhausted() {
            break;
        }
        let start = parser.position();
        loop {
            match parser.next() {
                Ok(Token::CurlyBracketBlock) => {
                    let _: Result<(), ParseError<()>> = parser.parse_nested_block(|_| Ok(()));
                    break;
                }
                Ok(Token::Semicolon) => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        let rule_text = parser.slice_from(start);
        if !rule_text.trim().is_empty() {
            rules.push(CssRule::from_text(rule_text));
        }
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_top_level_rules() {
        let rules = split_rules(
            "@import url(a.css);\n\
             /* hero */ .hero { background: url(\"x}.png\"); }\n\
             @font-face { font-family: A; src: url(a.woff2); }\n\
             @media (min-width: 10px) { .a { color: red } .b { color: blue } }",
        );
        let kinds: Vec<_> = rules.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RuleKind::Other,
                RuleKind::Style,
                RuleKind::FontFace,
                RuleKind::Other
            ]
        );
        assert_eq!(rules[1].css_text, ".hero { background: url(\"x}.png\"); }");
    }

    #[test]
    fn braces_and_semicolons_inside_strings_do_not_split() {
        let rules = split_rules(
            ".a::before { content: \"};\" }\n/* x; } */\n@FONT-FACE { src: url('f;.woff2') }\n@charset \"utf-8\";",
        );
        let kinds: Vec<_> = rules.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![RuleKind::Style, RuleKind::FontFace, RuleKind::Other]);
        assert_eq!(rules[0].css_text, ".a::before { content: \"};\" }");
        assert_eq!(rules[2].css_text, "@charset \"utf-8\";");
    }

    #[test]
    fn insert_and_delete_respect_bounds() {
        let mut sheet = StyleSheet::from_text(None, ".a{} .b{}");
        assert_eq!(sheet.delete_rule(5), Err(DomError::IndexSize(5)));
        sheet.delete_rule(0).unwrap();
        sheet.insert_rule(".c { color: red }", 0).unwrap();
        let texts: Vec<_> = sheet
            .css_rules()
            .unwrap()
            .iter()
            .map(|r| r.css_text.as_str())
            .collect();
        assert_eq!(texts, vec![".c { color: red }", ".b{}"]);
        assert!(matches!(
            sheet.insert_rule(".x{} .y{}", 0),
            Err(DomError::Syntax(_))
        ));
    }

    #[test]
    fn cross_origin_rules_are_hidden() {
        let mut sheet = StyleSheet::external("https://cdn.example/x.css", ".a{}", true);
        assert_eq!(sheet.css_rules().unwrap_err(), DomError::Security);
        assert_eq!(sheet.delete_rule(0), Err(DomError::Security));
    }
}
