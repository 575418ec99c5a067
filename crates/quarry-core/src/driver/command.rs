use crate::{Error, Result};

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Deserialize;
use serde_json::Value;

/// What a query setting asks its connection to run: literal query text with
/// driver-native parameter binding, or a method/URL pair for remote backends.
#[derive(Debug, Clone)]
pub enum Command {
    Sql(String),
    Http(HttpCommand),
}

impl Command {
    /// Diagnostic rendering echoed on responses outside production.
    pub fn display(&self) -> String {
        match self {
            Command::Sql(text) => text.clone(),
            Command::Http(cmd) => format!("{} {}", cmd.method.as_str(), cmd.url),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpCommand {
    pub method: HttpMethod,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Patch => "patch",
            HttpMethod::Delete => "delete",
            HttpMethod::Head => "head",
        }
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(HttpMethod::Get),
            "post" => Ok(HttpMethod::Post),
            "put" => Ok(HttpMethod::Put),
            "patch" => Ok(HttpMethod::Patch),
            "delete" => Ok(HttpMethod::Delete),
            "head" => Ok(HttpMethod::Head),
            other => Err(Error::configuration(format!(
                "unknown HTTP method `{other}`"
            ))),
        }
    }
}

impl HttpCommand {
    /// Parses an encoded command literal: either a JSON object
    /// (`{"method": "get", "url": "/items/{id}"}`) or the shorthand
    /// `get /items/{id}`. A malformed literal is a deployment defect and
    /// fails at discovery time.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();

        if text.starts_with('{') {
            return serde_json::from_str(text).map_err(|err| {
                Error::configuration(format!("malformed HTTP command literal: {err}"))
            });
        }

        let (method, url) = text.split_once(char::is_whitespace).ok_or_else(|| {
            Error::configuration(format!(
                "malformed HTTP command literal `{text}`; expected `<method> <url>`"
            ))
        })?;

        Ok(Self {
            method: method.parse()?,
            url: url.trim().to_string(),
        })
    }

    /// Resolves `{placeholder}` segments positionally against `params`, in
    /// order of appearance. Placeholder names are documentation only; the
    /// first placeholder takes the first parameter, and so on.
    pub fn resolve_url(&self, params: &[Value]) -> Result<String> {
        let mut out = String::with_capacity(self.url.len());
        let mut rest = self.url.as_str();
        let mut index = 0;

        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                return Err(Error::configuration(format!(
                    "unterminated placeholder in url `{}`",
                    self.url
                )));
            };

            out.push_str(&rest[..start]);
            let param = params.get(index).ok_or_else(|| {
                Error::configuration(format!(
                    "url `{}` has more placeholders than parameters ({} supplied)",
                    self.url,
                    params.len()
                ))
            })?;
            out.push_str(&render_param(param));

            index += 1;
            rest = &rest[start + len + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

/// Bytes that may not pass through a substituted path segment unescaped.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Strings interpolate from their text form, other values from their JSON
/// rendering; either way the result is percent-encoded so a parameter cannot
/// rewrite the request path.
fn render_param(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    utf8_percent_encode(&text, SEGMENT).to_string()
}
