// 该文件是 Zheyan （遮掩） 项目的一部分。
// src/model/http_classifier.rs - HTTP 远程分类服务
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{io::Cursor, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{ImageFormat, RgbImage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl,
  model::{ClassScore, Classifier, ClassifierError, ClassifierResult, ClassifyOptions},
};

const HTTP_CLASSIFIER_DEFAULT_TIMEOUT_MS: u64 = 120_000;

#[derive(Serialize)]
struct ClassifyRequest<'a> {
  image: String,
  classifier_ids: &'a [String],
  threshold: f32,
}

#[derive(Deserialize)]
struct ClassifyResponse {
  #[serde(default)]
  images: Vec<ClassifiedImage>,
}

#[derive(Deserialize)]
struct ClassifiedImage {
  #[serde(default)]
  classifiers: Vec<ClassifierEntry>,
}

#[derive(Deserialize)]
struct ClassifierEntry {
  #[serde(default)]
  classifier_id: String,
  #[serde(default)]
  classes: Vec<ClassEntry>,
}

#[derive(Deserialize)]
struct ClassEntry {
  class: String,
  score: Option<f32>,
}

impl ClassifyResponse {
  /// 只保留第一张图像的模型结果
  fn into_results(self) -> Vec<ClassifierResult> {
    self
      .images
      .into_iter()
      .next()
      .map(|image| {
        image
          .classifiers
          .into_iter()
          .map(|entry| ClassifierResult {
            classifier_id: entry.classifier_id,
            classes: entry
              .classes
              .into_iter()
              .map(|class| ClassScore {
                class_name: class.class,
                score: class.score,
              })
              .collect(),
          })
          .collect()
      })
      .unwrap_or_default()
  }
}

/// 通过 HTTP 调用的远程分类服务
///
/// URL 形如 `https://host/v3/classify?api_key=KEY&timeout_ms=5000`，
/// `api_key` 与 `timeout_ms` 会从请求地址中剥离。
pub struct HttpClassifier {
  client: Client,
  endpoint: Url,
  api_key: Option<String>,
}

impl FromUrl for HttpClassifier {
  type Error = ClassifierError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != "http" && url.scheme() != "https" {
      error!("分类服务必须使用 http 或 https 方案, 实际为 {}", url.scheme());
      return Err(ClassifierError::Other(format!(
        "不支持的分类服务方案: {}",
        url.scheme()
      )));
    }

    let mut api_key = None;
    let mut timeout_ms = HTTP_CLASSIFIER_DEFAULT_TIMEOUT_MS;
    let mut rest = Vec::new();
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "api_key" => api_key = Some(v.into_owned()),
        "timeout_ms" => {
          timeout_ms = v.parse().map_err(|e| {
            error!("无法解析 timeout_ms={}: {}", v, e);
            ClassifierError::Other(format!("无效的 timeout_ms: {}", v))
          })?;
        }
        _ => rest.push((k.into_owned(), v.into_owned())),
      }
    }

    let mut endpoint = url.clone();
    endpoint.set_query(None);
    if !rest.is_empty() {
      endpoint.query_pairs_mut().extend_pairs(rest);
    }

    let client = Client::builder()
      .timeout(Duration::from_millis(timeout_ms))
      .build()
      .map_err(|e| ClassifierError::Other(e.to_string()))?;

    info!("分类服务地址: {}", endpoint);
    Ok(Self {
      client,
      endpoint,
      api_key,
    })
  }
}

impl HttpClassifier {
  /// 命令行给出的密钥优先于 URL 中的密钥
  pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
    if api_key.is_some() {
      self.api_key = api_key;
    }
    self
  }

  pub fn endpoint(&self) -> &Url {
    &self.endpoint
  }
}

fn encode_png(image: &RgbImage) -> Result<String, ClassifierError> {
  let mut buffer = Cursor::new(Vec::new());
  image
    .write_to(&mut buffer, ImageFormat::Png)
    .map_err(|e| ClassifierError::Other(format!("图像编码失败: {}", e)))?;
  Ok(STANDARD.encode(buffer.into_inner()))
}

fn status_error(status: u16, classifier_ids: &[String]) -> ClassifierError {
  match status {
    401 | 403 => ClassifierError::Unauthorized,
    404 => ClassifierError::ModelNotFound(classifier_ids.join(",")),
    500..=599 => ClassifierError::Server(status),
    _ => ClassifierError::Other(format!("HTTP {}", status)),
  }
}

fn transport_error(err: reqwest::Error) -> ClassifierError {
  if err.is_connect() || err.is_timeout() {
    ClassifierError::Connectivity(err.to_string())
  } else {
    ClassifierError::Other(err.to_string())
  }
}

#[async_trait]
impl Classifier for HttpClassifier {
  async fn classify(
    &self,
    image: &RgbImage,
    options: &ClassifyOptions,
  ) -> Result<Vec<ClassifierResult>, ClassifierError> {
    let request = ClassifyRequest {
      image: encode_png(image)?,
      classifier_ids: &options.classifier_ids,
      threshold: options.threshold,
    };

    let mut builder = self.client.post(self.endpoint.clone()).json(&request);
    if let Some(key) = &self.api_key {
      builder = builder.basic_auth("apikey", Some(key));
    }

    let response = builder.send().await.map_err(transport_error)?;
    let status = response.status();
    if !status.is_success() {
      debug!("分类服务返回 {}", status);
      return Err(status_error(status.as_u16(), &options.classifier_ids));
    }

    let body: ClassifyResponse = response
      .json()
      .await
      .map_err(|e| ClassifierError::Other(format!("响应解析失败: {}", e)))?;
    Ok(body.into_results())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;
  use tokio::task::JoinHandle;

  const USB_RESPONSE: &str = r#"{"images":[{"classifiers":[{"classifier_id":"custom_1","classes":[{"class":"usb","score":0.75}]}]}]}"#;

  fn request_complete(request: &[u8]) -> bool {
    let text = String::from_utf8_lossy(request);
    let Some(end) = text.find("\r\n\r\n") else {
      return false;
    };
    let length = text[..end]
      .lines()
      .find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.eq_ignore_ascii_case("content-length") {
          value.trim().parse::<usize>().ok()
        } else {
          None
        }
      })
      .unwrap_or(0);
    request.len() >= end + 4 + length
  }

  /// 在本机端口上应答一次请求，返回服务地址与收到的原始请求
  async fn serve_once(status: &'static str, body: &'static str) -> (Url, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut request = Vec::new();
      let mut buf = [0u8; 4096];
      while !request_complete(&request) {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
          break;
        }
        request.extend_from_slice(&buf[..n]);
      }
      let response = format!(
        "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
      );
      socket.write_all(response.as_bytes()).await.unwrap();
      let _ = socket.shutdown().await;
      String::from_utf8_lossy(&request).into_owned()
    });
    let url = Url::parse(&format!("http://{}/v3/classify?api_key=secret", addr)).unwrap();
    (url, handle)
  }

  fn options() -> ClassifyOptions {
    ClassifyOptions {
      classifier_ids: vec!["custom_1".to_string()],
      threshold: 0.5,
    }
  }

  #[test]
  fn parses_service_response() {
    let body = r#"{
      "images": [{
        "classifiers": [
          {"classifier_id": "custom_1", "classes": [{"class": "USB", "score": 0.82}, {"class": "hdmi"}]},
          {"classifier_id": "custom_2", "classes": []}
        ]
      }]
    }"#;
    let response: ClassifyResponse = serde_json::from_str(body).unwrap();
    let results = response.into_results();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].classifier_id, "custom_1");
    assert_eq!(results[0].classes[0].score, Some(0.82));
    assert_eq!(results[0].classes[1].class_name, "hdmi");
    assert_eq!(results[0].classes[1].score, None);
  }

  #[test]
  fn empty_response_has_no_results() {
    let response: ClassifyResponse = serde_json::from_str("{}").unwrap();
    assert!(response.into_results().is_empty());
  }

  #[test]
  fn maps_status_codes() {
    let ids = vec!["a".to_string(), "b".to_string()];
    assert_eq!(status_error(401, &ids), ClassifierError::Unauthorized);
    assert_eq!(status_error(403, &ids), ClassifierError::Unauthorized);
    assert_eq!(
      status_error(404, &ids),
      ClassifierError::ModelNotFound("a,b".to_string())
    );
    assert_eq!(status_error(503, &ids), ClassifierError::Server(503));
    assert!(matches!(status_error(418, &ids), ClassifierError::Other(_)));
  }

  #[test]
  fn strips_credentials_from_endpoint() {
    let url = Url::parse("https://vr.example.com/v3/classify?version=2018-03-19&api_key=secret&timeout_ms=10").unwrap();
    let classifier = HttpClassifier::from_url(&url).unwrap();

    assert_eq!(classifier.api_key.as_deref(), Some("secret"));
    assert_eq!(
      classifier.endpoint().as_str(),
      "https://vr.example.com/v3/classify?version=2018-03-19"
    );
  }

  #[test]
  fn rejects_non_http_scheme() {
    let url = Url::parse("image:///tmp/model").unwrap();
    assert!(HttpClassifier::from_url(&url).is_err());
  }

  #[test]
  fn rejects_malformed_timeout() {
    let url = Url::parse("https://vr.example.com/v3/classify?timeout_ms=soon").unwrap();
    assert!(matches!(
      HttpClassifier::from_url(&url),
      Err(ClassifierError::Other(_))
    ));
  }

  #[tokio::test]
  async fn posts_image_with_credentials() {
    let (url, server) = serve_once("200 OK", USB_RESPONSE).await;
    let classifier = HttpClassifier::from_url(&url).unwrap();

    let image = RgbImage::from_pixel(8, 8, image::Rgb([1, 2, 3]));
    let results = classifier.classify(&image, &options()).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].classifier_id, "custom_1");
    assert_eq!(results[0].classes[0].score, Some(0.75));

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /v3/classify HTTP/1.1\r\n"), "{}", request);
    let auth = format!("authorization: basic {}", STANDARD.encode("apikey:secret"));
    assert!(
      request.to_ascii_lowercase().contains(&auth.to_ascii_lowercase()),
      "{}",
      request
    );

    let (_, body) = request.split_once("\r\n\r\n").unwrap();
    let body: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(body["classifier_ids"], serde_json::json!(["custom_1"]));
    assert_eq!(body["threshold"], serde_json::json!(0.5));
    let png = STANDARD.decode(body["image"].as_str().unwrap()).unwrap();
    let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png)
      .unwrap()
      .to_rgb8();
    assert_eq!(decoded, image);
  }

  #[tokio::test]
  async fn unauthorized_response() {
    let (url, server) = serve_once("401 Unauthorized", "{}").await;
    let classifier = HttpClassifier::from_url(&url).unwrap();

    let result = classifier.classify(&RgbImage::new(4, 4), &options()).await;
    assert_eq!(result, Err(ClassifierError::Unauthorized));
    server.await.unwrap();
  }

  #[tokio::test]
  async fn server_error_response() {
    let (url, server) = serve_once("500 Internal Server Error", "{}").await;
    let classifier = HttpClassifier::from_url(&url).unwrap();

    let result = classifier.classify(&RgbImage::new(4, 4), &options()).await;
    assert_eq!(result, Err(ClassifierError::Server(500)));
    server.await.unwrap();
  }

  #[tokio::test]
  async fn refused_connection_is_connectivity() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = Url::parse(&format!("http://{}/v3/classify", addr)).unwrap();
    let classifier = HttpClassifier::from_url(&url).unwrap();
    let result = classifier.classify(&RgbImage::new(4, 4), &options()).await;
    assert!(matches!(result, Err(ClassifierError::Connectivity(_))), "{:?}", result);
  }
}
