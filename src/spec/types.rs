use serde_json::Value;
use std::fmt;

/// Where a parameter is carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParameterLocation {
    /// Lowercase name as used by the `in` keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
            ParameterLocation::Cookie => "cookie",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "path" => Some(ParameterLocation::Path),
            "query" => Some(ParameterLocation::Query),
            "header" => Some(ParameterLocation::Header),
            "cookie" => Some(ParameterLocation::Cookie),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<oas3::spec::ParameterIn> for ParameterLocation {
    fn from(loc: oas3::spec::ParameterIn) -> Self {
        match loc {
            oas3::spec::ParameterIn::Path => ParameterLocation::Path,
            oas3::spec::ParameterIn::Query => ParameterLocation::Query,
            oas3::spec::ParameterIn::Header => ParameterLocation::Header,
            oas3::spec::ParameterIn::Cookie => ParameterLocation::Cookie,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterStyle {
    Matrix,
    Label,
    Form,
    Simple,
    SpaceDelimited,
    PipeDelimited,
    DeepObject,
}

impl ParameterStyle {
    /// Default serialization style for a location.
    pub fn default_for(location: ParameterLocation) -> Self {
        match location {
            ParameterLocation::Query | ParameterLocation::Cookie => ParameterStyle::Form,
            ParameterLocation::Path | ParameterLocation::Header => ParameterStyle::Simple,
        }
    }

    /// Separator used between array items for delimited styles.
    pub fn delimiter(&self) -> char {
        match self {
            ParameterStyle::SpaceDelimited => ' ',
            ParameterStyle::PipeDelimited => '|',
            _ => ',',
        }
    }
}

impl From<oas3::spec::ParameterStyle> for ParameterStyle {
    fn from(style: oas3::spec::ParameterStyle) -> Self {
        use oas3::spec::ParameterStyle as PS;
        match style {
            PS::Matrix => ParameterStyle::Matrix,
            PS::Label => ParameterStyle::Label,
            PS::Form => ParameterStyle::Form,
            PS::Simple => ParameterStyle::Simple,
            PS::SpaceDelimited => ParameterStyle::SpaceDelimited,
            PS::PipeDelimited => ParameterStyle::PipeDelimited,
            PS::DeepObject => ParameterStyle::DeepObject,
        }
    }
}

/// Major OpenAPI version family. The two differ in schema dialect and in
/// how binary content is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenApiVersion {
    V30,
    V31,
}

impl OpenApiVersion {
    pub fn detect(version: &str) -> Option<Self> {
        if version.starts_with("3.0.") || version == "3.0" {
            Some(OpenApiVersion::V30)
        } else if version.starts_with("3.1.") || version == "3.1" {
            Some(OpenApiVersion::V31)
        } else {
            None
        }
    }
}

impl fmt::Display for OpenApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenApiVersion::V30 => write!(f, "3.0"),
            OpenApiVersion::V31 => write!(f, "3.1"),
        }
    }
}

/// A resolved parameter declaration (path item and operation levels merged).
#[derive(Debug, Clone)]
pub struct ParameterMeta {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    /// Schema with local `$ref`s already expanded.
    pub schema: Option<Value>,
    pub style: ParameterStyle,
    pub explode: bool,
    /// JSON pointer of the compiled schema inside the document.
    pub schema_pointer: String,
}

/// A single declared operation.
#[derive(Debug, Clone)]
pub struct OperationMeta {
    /// Path template exactly as declared, e.g. `/users/{id}`.
    pub path: String,
    /// Lowercase HTTP method.
    pub method: String,
    pub operation_id: Option<String>,
    pub parameters: Vec<ParameterMeta>,
    /// JSON pointer of the operation object inside the document.
    pub pointer: String,
}
