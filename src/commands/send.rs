use super::CommonOptions;
use anyhow::{Context, Result};
use apilab_api::v1::relay::{RelayBody, RelayRequest, RelayResponse};
use clap::Args;
use std::io::Write;

/// Send an HTTP request through the relay and print the captured response.
#[derive(Args)]
pub struct SendCommand {
    /// The common command options.
    #[clap(flatten)]
    pub common: CommonOptions,

    /// The URL of the target.
    #[clap(value_name = "URL")]
    pub url: String,

    /// The HTTP method to use.
    #[clap(short = 'X', long, value_name = "METHOD", default_value = "GET")]
    pub method: String,

    /// A header to send, as `Name: Value`; may be repeated.
    #[clap(short = 'H', long = "header", value_name = "HEADER", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// The request body; ignored for GET and HEAD requests.
    #[clap(short = 'd', long, value_name = "BODY")]
    pub data: Option<String>,

    /// Send the body as a JSON value.
    #[clap(long, requires = "data")]
    pub json: bool,

    /// Print the response headers.
    #[clap(short = 'i', long)]
    pub include: bool,
}

impl SendCommand {
    /// Executes the command.
    pub async fn exec(self) -> Result<()> {
        let client = self.common.create_client()?;
        let request = self.relay_request()?;
        tracing::debug!(
            "relaying {method} request to `{url}`",
            method = self.method,
            url = self.url
        );

        let response = client.relay(&request).await?;
        Self::print_response(&response, self.include)
    }

    fn relay_request(&self) -> Result<RelayRequest> {
        let mut request = RelayRequest::new(&self.url).with_method(&self.method);
        for (name, value) in &self.headers {
            request = request.with_header(name, value);
        }

        if let Some(data) = &self.data {
            let body = if self.json {
                let value: serde_json::Value = serde_json::from_str(data)
                    .context("the request body is not valid JSON")?;
                let has_content_type = self
                    .headers
                    .iter()
                    .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
                if !has_content_type {
                    request = request.with_header("Content-Type", "application/json");
                }
                RelayBody::from(value)
            } else {
                RelayBody::Text(data.clone())
            };
            request = request.with_body(body);
        }

        Ok(request)
    }

    fn print_response(response: &RelayResponse, include: bool) -> Result<()> {
        println!(
            "{status} {text}",
            status = response.status,
            text = response.status_text
        );

        if include {
            for (name, value) in &response.headers {
                println!("{name}: {value}");
            }
        }
        println!();

        let body = response
            .body_bytes()
            .context("the relay returned a malformed base64 body")?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&body)?;
        stdout.flush()?;
        Ok(())
    }
}

fn parse_header(header: &str) -> Result<(String, String), String> {
    let (name, value) = header
        .split_once(':')
        .ok_or_else(|| format!("header `{header}` must have the form `Name: Value`"))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header `{header}` has an empty name"));
    }

    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(args: &[&str]) -> SendCommand {
        #[derive(clap::Parser)]
        struct Cli {
            #[clap(flatten)]
            send: SendCommand,
        }

        use clap::Parser;
        let mut argv = vec!["apilab"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv).send
    }

    #[test]
    fn parses_headers() {
        assert_eq!(
            parse_header("X-Test: abc").unwrap(),
            ("X-Test".to_string(), "abc".to_string())
        );
        assert_eq!(
            parse_header("Authorization:Bearer a:b").unwrap(),
            ("Authorization".to_string(), "Bearer a:b".to_string())
        );
        assert!(parse_header("no separator").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn builds_json_requests_with_a_content_type() {
        let request = command(&[
            "https://example.test/echo",
            "-X",
            "post",
            "-d",
            r#"{"a":1}"#,
            "--json",
        ])
        .relay_request()
        .unwrap();

        assert_eq!(request.url.as_deref(), Some("https://example.test/echo"));
        assert_eq!(request.method.as_deref(), Some("post"));
        assert_eq!(
            request.headers.unwrap()["Content-Type"],
            "application/json"
        );
        assert_eq!(request.body.unwrap().into_text(), r#"{"a":1}"#);
    }

    #[test]
    fn keeps_text_bodies_verbatim() {
        let request = command(&[
            "https://example.test/echo",
            "-X",
            "PUT",
            "-H",
            "content-type: text/plain",
            "-d",
            "hello",
        ])
        .relay_request()
        .unwrap();

        assert_eq!(request.body, Some(RelayBody::Text("hello".to_string())));
        assert_eq!(request.headers.unwrap().len(), 1);
    }

    #[test]
    fn rejects_invalid_json_bodies() {
        let err = command(&["https://example.test", "-X", "POST", "-d", "{", "--json"])
            .relay_request()
            .unwrap_err();
        assert_eq!(err.to_string(), "the request body is not valid JSON");
    }
}
