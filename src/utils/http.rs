use reqwest::Response;

use super::truncate_body;
use crate::errors::Error;

/// Pass a 2xx response through, otherwise turn it into `Error::RemoteStatus`
/// carrying at most `limit` bytes of the body.
pub async fn ensure_success(
    response: Response,
    operation: &str,
    limit: usize,
) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::RemoteStatus {
        operation: operation.to_string(),
        status: status.as_u16(),
        body: truncate_body(&body, limit),
    })
}

/// Single-shot HTTP responder for client tests.
#[cfg(test)]
pub(crate) mod testing {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// The raw request as seen on the wire, headers and body.
    pub struct Captured {
        pub head: String,
        pub body: Vec<u8>,
    }

    /// Answer exactly one request with `status` and `body`. Returns the base
    /// URL and a handle resolving to the captured request.
    pub async fn serve_once(status: u16, body: &'static [u8]) -> (String, JoinHandle<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 8192];
            let header_end = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before headers");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
            let length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            while buf.len() < header_end + length {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status} Test\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.unwrap();

            Captured {
                head,
                body: buf[header_end..].to_vec(),
            }
        });
        (base, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::serve_once;
    use super::*;

    #[tokio::test]
    async fn non_success_status_carries_truncated_body() {
        let (base, server) = serve_once(500, b"  internal failure with a long tail  ").await;
        let response = reqwest::get(format!("{base}/boom")).await.unwrap();

        let err = ensure_success(response, "GET /boom", 16).await.unwrap_err();
        server.await.unwrap();
        match err {
            Error::RemoteStatus { operation, status, body } => {
                assert_eq!(operation, "GET /boom");
                assert_eq!(status, 500);
                assert_eq!(body, "internal failure...");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
