use std::time::Duration;

use reqwest::{header, StatusCode};

use crate::{
    api,
    error::{AcmeError, Result},
    trans::AcmeResponse,
};

const JOSE_JSON: &str = "application/jose+json";
const PROBLEM_JSON: &str = "application/problem+json";

pub(crate) fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(30))
        .build()
}

pub(crate) async fn req_get(client: &reqwest::Client, url: &str) -> Result<AcmeResponse> {
    log::trace!("GET {url}");
    let res = client.get(url).send().await?;
    req_handle_response(res).await
}

pub(crate) async fn req_post(
    client: &reqwest::Client,
    url: &str,
    body: String,
    accept: Option<&str>,
) -> Result<AcmeResponse> {
    log::trace!("POST {url} {body}");

    let mut req = client
        .post(url)
        .header(header::CONTENT_TYPE, JOSE_JSON)
        .body(body);

    if let Some(accept) = accept {
        req = req.header(header::ACCEPT, accept);
    }

    let res = req.send().await?;
    req_handle_response(res).await
}

/// Reads the whole response and turns problem documents into [`AcmeError`]s.
///
/// Failing to read the body after the headers arrived is still a transport error.
async fn req_handle_response(res: reqwest::Response) -> Result<AcmeResponse> {
    let status = res.status();
    let nonce = req_replay_nonce(&res);
    let location = req_header(&res, header::LOCATION.as_str());
    let content_type = req_header(&res, header::CONTENT_TYPE.as_str());
    let retry_after = req_header(&res, header::RETRY_AFTER.as_str())
        .as_deref()
        .and_then(parse_retry_after);
    let body = res.text().await?;

    if let Some(problem) = req_problem(status, content_type.as_deref(), &body) {
        log::debug!("Problem from server: {problem}");
        return Err(AcmeError::new(problem, status.as_u16()).into());
    }

    Ok(AcmeResponse {
        status,
        nonce,
        location,
        content_type,
        retry_after,
        body,
    })
}

/// Classifies a response as a CA-reported problem.
///
/// Anything with status >= 400 is a problem, as is a body shaped like a problem document (`type`
/// and `detail` fields) regardless of status.
fn req_problem(status: StatusCode, content_type: Option<&str>, body: &str) -> Option<api::Problem> {
    let doc = serde_json::from_str::<serde_json::Value>(body).ok();

    let looks_like_problem = doc.as_ref().is_some_and(|doc| {
        doc.get("type").is_some_and(serde_json::Value::is_string)
            && doc.get("detail").is_some_and(serde_json::Value::is_string)
    });

    let is_problem_json = content_type.is_some_and(|ct| ct.starts_with(PROBLEM_JSON));

    if looks_like_problem || (status.as_u16() >= 400 && is_problem_json) {
        let problem = serde_json::from_str(body).unwrap_or_else(|err| api::Problem {
            _type: "problemJsonFail".to_owned(),
            detail: Some(format!(
                "Failed to deserialize application/problem+json ({err}) body: {body}"
            )),
            ..Default::default()
        });

        return Some(problem);
    }

    if status.as_u16() >= 400 {
        return Some(api::Problem {
            _type: "httpReqError".to_owned(),
            detail: Some(format!("{status} body: {body}")),
            ..Default::default()
        });
    }

    None
}

fn req_header(res: &reqwest::Response, name: &str) -> Option<String> {
    res.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Extracts the `Replay-Nonce` header.
///
/// Values that are not base64url are ignored, as [RFC 8555 §6.5.1] requires.
///
/// [RFC 8555 §6.5.1]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.5.1
fn req_replay_nonce(res: &reqwest::Response) -> Option<String> {
    let nonce = req_header(res, "replay-nonce")?;

    if is_base64url(&nonce) {
        Some(nonce)
    } else {
        log::debug!("Ignoring invalid replay-nonce: {nonce:?}");
        None
    }
}

/// Parses a `Retry-After` value given in seconds. HTTP dates are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn is_base64url(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_alphabet() {
        assert!(is_base64url("8_uBBV3N2DBRJczhoiB46ugJKUkUHxGzVe6xIMpjHFM"));
        assert!(!is_base64url(""));
        assert!(!is_base64url("abc=="));
        assert!(!is_base64url("a b"));
    }

    #[test]
    fn retry_after_seconds() {
        assert_eq!(parse_retry_after("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(" 120 "), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after("Fri, 31 Dec 1999 23:59:59 GMT"), None);
        assert_eq!(parse_retry_after("-1"), None);
    }

    #[test]
    fn problem_body_on_success_status() {
        let body = r#"{"type":"urn:ietf:params:acme:error:malformed","detail":"bad"}"#;
        let problem = req_problem(StatusCode::OK, Some("application/json"), body).unwrap();
        assert_eq!(problem.short_type(), "malformed");
    }

    #[test]
    fn challenge_object_is_not_a_problem() {
        // challenges carry a `type` but no `detail`
        let body = r#"{"type":"http-01","status":"pending","url":"u","token":"t"}"#;
        assert!(req_problem(StatusCode::OK, Some("application/json"), body).is_none());
    }

    #[test]
    fn error_status_without_problem_document() {
        let problem =
            req_problem(StatusCode::BAD_GATEWAY, Some("text/html"), "<html>oops</html>").unwrap();
        assert_eq!(problem._type, "httpReqError");
        assert!(problem.detail.unwrap().contains("502"));
    }

    #[test]
    fn unparsable_problem_json() {
        let problem = req_problem(StatusCode::FORBIDDEN, Some(PROBLEM_JSON), "{").unwrap();
        assert_eq!(problem._type, "problemJsonFail");
    }
}
