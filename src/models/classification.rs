//! Classification vocabulary
//!
//! The values every interception component exchanges with the classifier.

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Relationship carried by a `<link rel>` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkRel {
    Preconnect,
    Prefetch,
    Preload,
    ModulePreload,
    Icon,
    AppleTouchIcon,
    Stylesheet,
    Other,
}

impl LinkRel {
    /// Parse a `rel` attribute value; the first recognised token wins.
    pub fn parse(rel: &str) -> Self {
        for token in rel.split_whitespace() {
            let parsed = match token.to_ascii_lowercase().as_str() {
                "preconnect" => LinkRel::Preconnect,
                "prefetch" => LinkRel::Prefetch,
                "preload" => LinkRel::Preload,
                "modulepreload" => LinkRel::ModulePreload,
                "icon" => LinkRel::Icon,
                "apple-touch-icon" => LinkRel::AppleTouchIcon,
                "stylesheet" => LinkRel::Stylesheet,
                _ => continue,
            };
            return parsed;
        }
        LinkRel::Other
    }
}

/// The element (or call surface) through which a URL was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementKind {
    Image,
    Script,
    Source,
    Link(LinkRel),
    Meta,
    StyleText,
    FetchCall,
    XhrCall,
    Other,
}

impl ElementKind {
    /// Map a lower-case tag name (plus the `rel` attribute for links) to a kind.
    pub fn from_tag(tag: &str, rel: Option<&str>) -> Self {
        match tag {
            "img" => ElementKind::Image,
            "script" => ElementKind::Script,
            "source" => ElementKind::Source,
            "link" => ElementKind::Link(LinkRel::parse(rel.unwrap_or(""))),
            "meta" => ElementKind::Meta,
            "style" => ElementKind::StyleText,
            _ => ElementKind::Other,
        }
    }

    pub fn is_network_call(&self) -> bool {
        matches!(self, ElementKind::FetchCall | ElementKind::XhrCall)
    }
}

/// Attribute name used when classifying the text of an `@font-face` rule.
pub const FONT_FACE_ATTR: &str = "@font-face";

/// The decision a URL maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    RewriteToLocal,
    Block,
    StubNetworkCall,
    PassThrough,
}

/// Fixed-shape response returned in place of a CMS network call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntheticResponse {
    pub status: u16,
    pub body: serde_json::Value,
    pub content_type: String,
}

impl SyntheticResponse {
    /// `200 application/json {"items": []}`
    pub fn empty_items() -> Self {
        Self {
            status: 200,
            body: json!({ "items": [] }),
            content_type: "application/json".to_string(),
        }
    }

    pub fn body_text(&self) -> String {
        self.body.to_string()
    }

    /// Render as an HTTP response for the request-dispatch surface.
    pub fn into_http(self) -> Response<Bytes> {
        let mut response = Response::new(Bytes::from(self.body_text()));
        *response.status_mut() = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        let content_type = HeaderValue::from_str(&self.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/json"));
        response.headers_mut().insert(CONTENT_TYPE, content_type);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_rel_takes_first_known_token() {
        assert_eq!(LinkRel::parse("preconnect"), LinkRel::Preconnect);
        assert_eq!(LinkRel::parse("shortcut icon"), LinkRel::Icon);
        assert_eq!(LinkRel::parse("ModulePreload"), LinkRel::ModulePreload);
        assert_eq!(LinkRel::parse(""), LinkRel::Other);
    }

    #[test]
    fn element_kind_from_tag_reads_link_rel() {
        assert_eq!(
            ElementKind::from_tag("link", Some("prefetch")),
            ElementKind::Link(LinkRel::Prefetch)
        );
        assert_eq!(ElementKind::from_tag("img", None), ElementKind::Image);
        assert_eq!(ElementKind::from_tag("div", None), ElementKind::Other);
    }

    #[test]
    fn synthetic_response_renders_empty_items_json() {
        let response = SyntheticResponse::empty_items().into_http();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body, json!({ "items": [] }));
    }
}
