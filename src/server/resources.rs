use strum_macros::Display;

const INDEX_HTML: &str = include_str!("../../resources/web_debugger.html");
const SCRIPT_JS: &str = include_str!("../../resources/web_debugger.js");
const STYLE_CSS: &str = include_str!("../../resources/web_debugger.css");

/// Static web UI resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Resource {
    #[strum(serialize = "index.html")]
    Index,
    #[strum(serialize = "web_debugger.js")]
    Script,
    #[strum(serialize = "web_debugger.css")]
    Style,
}

impl Resource {
    /// Find resource by request path.
    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "/" | "/index.html" => Some(Resource::Index),
            "/web_debugger.js" => Some(Resource::Script),
            "/web_debugger.css" => Some(Resource::Style),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Resource::Index => "text/html; charset=utf-8",
            Resource::Script => "application/javascript",
            Resource::Style => "text/css",
        }
    }
}

/// Return bundled content of a resource.
pub fn builtin(resource: Resource) -> &'static str {
    match resource {
        Resource::Index => INDEX_HTML,
        Resource::Script => SCRIPT_JS,
        Resource::Style => STYLE_CSS,
    }
}
