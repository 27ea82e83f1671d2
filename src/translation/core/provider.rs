//! 外部翻译服务
//!
//! [`TranslationProvider`] 是翻译管道与外部服务之间的接缝，测试中用内存实现替换。
//! [`HttpTranslationProvider`] 通过 HTTP GET 调用翻译端点：
//!
//! ```text
//! GET <endpoint>?source-language=auto&target-language=es&format=translate&query=hello%20world
//! ```
//!
//! 响应体的第一个元素是 `[译文片段, 原文片段, ...]` 元组的有序列表，
//! 完整译文是所有译文片段按顺序拼接的结果。

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde_json::Value;
use url::Url;

use crate::translation::config::TranslatorConfig;
use crate::translation::error::{TranslationError, TranslationResult};

// 与 encodeURIComponent 一致：空格编码为 %20 而不是 +
const QUERY_COMPONENT_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-').remove(b'_').remove(b'.').remove(b'!').remove(b'~')
    .remove(b'*').remove(b'(').remove(b')');

/// 翻译服务接口
///
/// 运行在单线程事件循环上，实现不需要 `Send`。
#[async_trait(?Send)]
pub trait TranslationProvider {
    /// 将文本翻译为目标语言
    async fn translate(&self, text: &str, target_language: &str) -> TranslationResult<String>;

    /// 服务名称，用于日志
    fn name(&self) -> &str;
}

/// 基于 HTTP 的翻译服务
#[derive(Debug, Clone)]
pub struct HttpTranslationProvider {
    client: reqwest::Client,
    endpoint: Url,
    source_language: String,
}

impl HttpTranslationProvider {
    pub fn new(config: &TranslatorConfig) -> TranslationResult<Self> {
        let endpoint = Url::parse(&config.api_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| TranslationError::ConfigError(format!("无法创建HTTP客户端: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            source_language: config.source_lang.clone(),
        })
    }

    /// 构造请求地址
    pub fn request_url(&self, text: &str, target_language: &str) -> Url {
        let params = [
            ("source-language", self.source_language.as_str()),
            ("target-language", target_language),
            ("format", "translate"),
            ("query", text),
        ];
        let mut query: Vec<String> = self
            .endpoint
            .query()
            .filter(|existing| !existing.is_empty())
            .map(|existing| vec![existing.to_string()])
            .unwrap_or_default();
        query.extend(params.iter().map(|(name, value)| {
            format!("{}={}", name, utf8_percent_encode(value, QUERY_COMPONENT_SET))
        }));

        let mut url = self.endpoint.clone();
        url.set_query(Some(&query.join("&")));
        url
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait(?Send)]
impl TranslationProvider for HttpTranslationProvider {
    async fn translate(&self, text: &str, target_language: &str) -> TranslationResult<String> {
        let url = self.request_url(text, target_language);
        tracing::debug!("请求翻译: {} 字符 -> {}", text.chars().count(), target_language);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TranslationError::ProviderError(format!("HTTP {}", status)));
        }

        let body = response.text().await?;
        let value: Value = serde_json::from_str(&body)?;
        parse_translation_response(&value)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// 解析翻译响应
///
/// 第一个元素既可以是片段列表 `[["hola","hello"], ...]`，
/// 也可以直接是单个片段 `["hola mundo","hello world"]`。
pub fn parse_translation_response(body: &Value) -> TranslationResult<String> {
    let first = body
        .as_array()
        .and_then(|items| items.first())
        .ok_or_else(|| malformed("响应不是非空数组"))?;

    let segments: Vec<&Value> = match first {
        Value::Array(items) if items.first().map(Value::is_string).unwrap_or(false) => vec![first],
        Value::Array(items) => items.iter().collect(),
        _ => return Err(malformed("第一个元素不是数组")),
    };

    let mut translated = String::new();
    for segment in segments {
        match segment {
            Value::Array(parts) => match parts.first() {
                Some(Value::String(part)) => translated.push_str(part),
                Some(Value::Null) | None => {}
                Some(_) => return Err(malformed("译文片段不是字符串")),
            },
            Value::Null => {}
            _ => return Err(malformed("片段不是数组")),
        }
    }

    if translated.is_empty() {
        return Err(malformed("译文为空"));
    }

    Ok(translated)
}

fn malformed(reason: &str) -> TranslationError {
    TranslationError::ProviderError(format!("无效的翻译响应: {}", reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_single_segment() {
        let body = json!([["hola mundo", "hello world"]]);
        assert_eq!(parse_translation_response(&body).unwrap(), "hola mundo");
    }

    #[test]
    fn test_parse_concatenates_segments() {
        let body = json!([[["Hola. ", "Hello. ", null, null, 10], ["¿Qué tal?", "How are you?"]], null, "en"]);
        assert_eq!(parse_translation_response(&body).unwrap(), "Hola. ¿Qué tal?");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for body in [
            json!({}),
            json!([]),
            json!(["hola"]),
            json!([[]]),
            json!([[[42, "x"]]]),
            json!([[[""]]]),
        ] {
            let err = parse_translation_response(&body).unwrap_err();
            assert!(matches!(err, TranslationError::ProviderError(_)), "{body}");
        }
    }

    #[test]
    fn test_request_url_parameters() {
        let config = TranslatorConfig::with_api_url("http://localhost:1188/translate");
        let provider = HttpTranslationProvider::new(&config).unwrap();
        let url = provider.request_url("hello world & more", "es");

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("source-language".to_string(), "auto".to_string()),
                ("target-language".to_string(), "es".to_string()),
                ("format".to_string(), "translate".to_string()),
                ("query".to_string(), "hello world & more".to_string()),
            ]
        );
        assert_eq!(url.path(), "/translate");
    }

    #[test]
    fn test_request_url_percent_encodes_query() {
        let config = TranslatorConfig::with_api_url("http://localhost:1188/translate?key=abc");
        let provider = HttpTranslationProvider::new(&config).unwrap();
        let url = provider.request_url("hello world+1 ¿qué?", "es");

        assert_eq!(
            url.query(),
            Some(
                "key=abc&source-language=auto&target-language=es&format=translate\
                 &query=hello%20world%2B1%20%C2%BFqu%C3%A9%3F"
            )
        );
    }
}
