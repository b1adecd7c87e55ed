//! HTTP front end.
//!
//! | Route                        | Method | Purpose                         |
//! |------------------------------|--------|---------------------------------|
//! | `/api/v1/build`              | POST   | submit the one build            |
//! | `/api/v1/result/<name>`      | GET    | fetch a file the build produced |

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, error, info, warn};

use crate::admission::AdmissionError;
use crate::archive::IngestError;
use crate::consts::{OUTPUT_DIR, SUPPORTED_BUILD_CONTENT_TYPES};
use crate::result::load_result;
use crate::service::BuildService;

pub const BUILD_PATH: &str = "/api/v1/build";
pub const RESULT_PATH_PREFIX: &str = "/api/v1/result/";

/// Buffer between the build task and the response body.
const TRANSCRIPT_PIPE_CAPACITY: usize = 64 * 1024;

pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

#[derive(Debug, Error)]
pub enum ServerError {
  #[error("cannot listen on {addr}: {source}")]
  Bind {
    addr: SocketAddr,
    #[source]
    source: io::Error,
  },
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
  TcpListener::bind(addr)
    .await
    .map_err(|source| ServerError::Bind { addr, source })
}

/// Serve HTTP/1 connections from `listener` forever.
pub async fn serve(listener: TcpListener, service: Arc<BuildService>) {
  serve_until(listener, service, std::future::pending()).await
}

/// Serve until `shutdown` resolves.
///
/// Connections and builds already in flight keep running on the runtime.
pub async fn serve_until<F>(listener: TcpListener, service: Arc<BuildService>, shutdown: F)
where
  F: Future<Output = ()>,
{
  if let Ok(addr) = listener.local_addr() {
    info!(addr = %addr, "listening");
  }

  tokio::pin!(shutdown);
  loop {
    let (stream, peer) = tokio::select! {
      accepted = listener.accept() => match accepted {
        Ok(accepted) => accepted,
        Err(e) => {
          warn!(error = %e, "cannot accept connection");
          continue;
        }
      },
      _ = &mut shutdown => {
        info!("shutting down listener");
        return;
      }
    };

    let service = Arc::clone(&service);
    tokio::spawn(async move {
      let handler = service_fn(move |req| {
        let service = Arc::clone(&service);
        async move { Ok::<_, Infallible>(route(service, req).await) }
      });
      if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), handler)
        .await
      {
        debug!(peer = %peer, error = %e, "connection ended with error");
      }
    });
  }
}

async fn route(service: Arc<BuildService>, req: Request<Incoming>) -> Response<ResponseBody> {
  debug!(method = %req.method(), path = %req.uri().path(), "request");
  let path = req.uri().path().to_string();
  if path == BUILD_PATH {
    handle_build(service, req).await
  } else if let Some(name) = path.strip_prefix(RESULT_PATH_PREFIX) {
    handle_result(&service, req.method(), name).await
  } else {
    text_response(StatusCode::NOT_FOUND, "not found")
  }
}

async fn handle_build(service: Arc<BuildService>, req: Request<Incoming>) -> Response<ResponseBody> {
  if req.method() != Method::POST {
    return text_response(StatusCode::METHOD_NOT_ALLOWED, "build endpoint only supports POST");
  }

  let content_type = req
    .headers()
    .get(CONTENT_TYPE)
    .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
    .unwrap_or_default();
  if !SUPPORTED_BUILD_CONTENT_TYPES.contains(&content_type.as_str()) {
    return text_response(
      StatusCode::UNSUPPORTED_MEDIA_TYPE,
      &format!(
        "Content-Type must be [{}], got {}",
        SUPPORTED_BUILD_CONTENT_TYPES.join(" "),
        content_type
      ),
    );
  }

  let body = StreamReader::new(req.into_body().into_data_stream().map_err(io::Error::other));
  let build = match service.ingest(body).await {
    Ok(build) => build,
    Err(e) => return ingest_error_response(&e),
  };

  let (writer, reader) = tokio::io::duplex(TRANSCRIPT_PIPE_CAPACITY);
  tokio::spawn(async move {
    service.run(build, writer).await;
  });

  stream_response(StatusCode::CREATED, "text/plain; charset=utf-8", reader, None)
}

fn ingest_error_response(err: &IngestError) -> Response<ResponseBody> {
  match err {
    IngestError::Admission(AdmissionError::AlreadyBuilding) => {
      text_response(StatusCode::CONFLICT, "build already started")
    }
    IngestError::Admission(e) => {
      error!(error = %e, "cannot admit build");
      text_response(StatusCode::INTERNAL_SERVER_ERROR, "cannot create build dir")
    }
    IngestError::Task(e) => {
      error!(error = %e, "ingest task died");
      text_response(StatusCode::INTERNAL_SERVER_ERROR, "cannot unpack build request")
    }
    IngestError::Control(_) | IngestError::Manifest(_) | IngestError::Sources(_) => {
      text_response(StatusCode::BAD_REQUEST, &err.to_string())
    }
  }
}

async fn handle_result(service: &BuildService, method: &Method, name: &str) -> Response<ResponseBody> {
  if method != Method::GET {
    return text_response(StatusCode::METHOD_NOT_ALLOWED, "result endpoint only supports GET");
  }
  if !is_plain_file_name(name) {
    return text_response(StatusCode::BAD_REQUEST, &format!("invalid result name {:?}", name));
  }

  let config = service.config();
  match load_result(&config.result_path()).await {
    Ok(None) => return text_response(StatusCode::NOT_FOUND, "build result not available"),
    Ok(Some(result)) if !result.is_success() => {
      let reason = result.error.unwrap_or_default();
      return text_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("build failed: {}", reason));
    }
    Ok(Some(_)) => {}
    Err(e) => {
      error!(error = %e, "cannot read build result");
      return text_response(StatusCode::INTERNAL_SERVER_ERROR, "cannot read build result");
    }
  }

  let path = config.build_dir().join(OUTPUT_DIR).join(name);
  let file = match tokio::fs::File::open(&path).await {
    Ok(file) => file,
    Err(e) if e.kind() == io::ErrorKind::NotFound => {
      return text_response(StatusCode::NOT_FOUND, &format!("no result named {}", name));
    }
    Err(e) => {
      error!(path = %path.display(), error = %e, "cannot open result");
      return text_response(StatusCode::INTERNAL_SERVER_ERROR, "cannot open result");
    }
  };
  let len = match file.metadata().await {
    Ok(meta) if meta.is_file() => Some(meta.len()),
    Ok(_) => return text_response(StatusCode::NOT_FOUND, &format!("no result named {}", name)),
    Err(_) => None,
  };

  info!(path = %path.display(), "serving build result");
  stream_response(StatusCode::OK, "application/octet-stream", file, len)
}

/// A single path component that names a file directly inside the output dir.
fn is_plain_file_name(name: &str) -> bool {
  !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

fn text_response(status: StatusCode, message: &str) -> Response<ResponseBody> {
  let body = Full::new(Bytes::from(format!("{}\n", message)))
    .map_err(|never| match never {})
    .boxed_unsync();
  let mut response = Response::new(body);
  *response.status_mut() = status;
  response
    .headers_mut()
    .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
  response
}

fn stream_response<R>(status: StatusCode, content_type: &'static str, reader: R, len: Option<u64>) -> Response<ResponseBody>
where
  R: AsyncRead + Send + 'static,
{
  let body = StreamBody::new(ReaderStream::new(reader).map_ok(Frame::data)).boxed_unsync();
  let mut response = Response::new(body);
  *response.status_mut() = status;
  let headers = response.headers_mut();
  headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
  if let Some(len) = len {
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
  }
  response
}
