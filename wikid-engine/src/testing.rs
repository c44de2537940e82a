//! In-memory stores, request builders and a loopback HTTP client for unit
//! tests.

use std::collections::HashMap;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::extract::Request;
use axum::http::{Method, header};
use axum::response::Response;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use wikid_core::error::StoreError;
use wikid_core::page::{Page, PageStore};

#[derive(Default)]
pub struct MemoryStore {
    pages: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn with_page(self, title: &str, body: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(title.to_string(), body.as_bytes().to_vec());
        self
    }

    pub fn body(&self, title: &str) -> Option<Vec<u8>> {
        self.pages.lock().unwrap().get(title).cloned()
    }
}

impl PageStore for MemoryStore {
    fn load<'a>(
        &'a self,
        title: &'a str,
    ) -> impl Future<Output = Result<Page, StoreError>> + Send + 'a {
        let found = self.body(title);
        async move {
            found
                .map(|body| Page::new(title, body))
                .ok_or_else(|| StoreError::NotFound {
                    title: title.to_string(),
                })
        }
    }

    fn save<'a>(
        &'a self,
        page: &'a Page,
    ) -> impl Future<Output = Result<(), StoreError>> + Send + 'a {
        self.pages
            .lock()
            .unwrap()
            .insert(page.title.clone(), page.body.clone());
        async { Ok(()) }
    }
}

/// A store whose every operation fails with a non-`NotFound` I/O error.
pub struct BrokenStore;

impl PageStore for BrokenStore {
    fn load<'a>(
        &'a self,
        title: &'a str,
    ) -> impl Future<Output = Result<Page, StoreError>> + Send + 'a {
        async move { Err(StoreError::read(title, io::Error::other("disk on fire"))) }
    }

    fn save<'a>(
        &'a self,
        page: &'a Page,
    ) -> impl Future<Output = Result<(), StoreError>> + Send + 'a {
        async move { Err(StoreError::write(&page.title, io::Error::other("disk full"))) }
    }
}

pub fn get(uri: &str) -> Request {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_form(uri: &str, form: &str) -> Request {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

pub async fn body_text(resp: Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Serves `app` on an ephemeral loopback port and returns its address.
pub async fn serve(app: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

/// One request on a fresh connection; returns the raw response.
pub async fn send_raw(addr: &str, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .expect("timed out reading response")
        .unwrap();
    String::from_utf8(out).unwrap()
}

pub fn http_get(path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n")
}

pub fn http_post_form(path: &str, form: &str) -> String {
    format!(
        "POST {path} HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\
         Content-Type: application/x-www-form-urlencoded\r\n\
         Content-Length: {}\r\n\r\n{form}",
        form.len()
    )
}
