//! Shared fakes for integration tests: a synthetic page environment with
//! scripted fetch routes, inline-completing host primitives, and a
//! metadata-block builder.
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use gmshim::error::{Error, Result};
use gmshim::http::{HttpFailure, HttpRequest, HttpResponse, RawHttpFn};
use gmshim::page::{PageEnvironment, StyleElement};
use gmshim::table::ResourceUrlFn;
use parking_lot::Mutex;
use serde_json::Value;

/// Run a future to completion on the test thread.
pub fn run_async<T, Fut>(future: Fut) -> T
where
    Fut: Future<Output = T>,
{
    futures::executor::block_on(future)
}

/// Build a userscript metadata block declaring the given grants.
pub fn meta(grants: &[&str]) -> String {
    let mut block = String::from("// ==UserScript==\n// @name test-script\n");
    for grant in grants {
        block.push_str(&format!("// @grant        {grant}\n"));
    }
    block.push_str("// ==/UserScript==\n");
    block
}

pub fn response(status: u16, content_type: Option<&str>, body: &[u8]) -> HttpResponse {
    HttpResponse {
        status,
        status_text: if status == 200 { "OK" } else { "" }.to_string(),
        content_type: content_type.map(str::to_string),
        body: body.to_vec(),
    }
}

/// Synthetic page environment. Fetch serves scripted routes plus any
/// object URLs minted through it; injection can be scripted to fail.
#[derive(Default)]
pub struct FakePage {
    head_present: AtomicBool,
    inject_fails: AtomicBool,
    injected: AtomicBool,
    responses: Mutex<HashMap<String, HttpResponse>>,
    stored_objects: Mutex<HashMap<String, HttpResponse>>,
    object_counter: AtomicUsize,
    pub appended: Mutex<Vec<StyleElement>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_head(self) -> Self {
        self.head_present.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_injection(self) -> Self {
        self.inject_fails.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_response(self, url: &str, response: HttpResponse) -> Self {
        self.responses.lock().insert(url.to_string(), response);
        self
    }

    pub fn was_injected(&self) -> bool {
        self.injected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageEnvironment for FakePage {
    async fn fetch(&self, url: &str, _options: &Value) -> Result<HttpResponse> {
        if let Some(response) = self.responses.lock().get(url) {
            return Ok(response.clone());
        }
        if let Some(response) = self.stored_objects.lock().get(url) {
            return Ok(response.clone());
        }
        Err(Error::fetch(format!("unknown url: {url}")))
    }

    fn create_object_url(&self, body: Vec<u8>, content_type: Option<String>) -> String {
        let n = self.object_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let url = format!("blob:test-{n}");
        self.stored_objects.lock().insert(
            url.clone(),
            HttpResponse {
                status: 200,
                status_text: "OK".to_string(),
                content_type,
                body,
            },
        );
        url
    }

    fn has_document_head(&self) -> bool {
        self.head_present.load(Ordering::SeqCst)
    }

    fn append_to_head(&self, element: &StyleElement) {
        self.appended.lock().push(element.clone());
    }

    fn inject_responder(&self) -> Result<()> {
        if self.inject_fails.load(Ordering::SeqCst) {
            return Err(Error::injection("page refused the data-url script"));
        }
        self.injected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Host network primitive completing inline from a url → response map.
/// Unrouted urls complete through `on_error`.
pub fn scripted_raw_http(routes: Vec<(&str, HttpResponse)>) -> RawHttpFn {
    let routes: HashMap<String, HttpResponse> = routes
        .into_iter()
        .map(|(url, response)| (url.to_string(), response))
        .collect();
    Arc::new(move |details: HttpRequest| match routes.get(&details.url) {
        Some(response) => {
            if let Some(on_load) = &details.on_load {
                on_load(response);
            }
        }
        None => {
            if let Some(on_error) = &details.on_error {
                on_error(&HttpFailure::new(format!("no route for {}", details.url)));
            }
        }
    })
}

/// Host resource accessor resolving names from a fixed map.
pub fn scripted_resource_url(routes: Vec<(&str, &str)>) -> ResourceUrlFn {
    let routes: HashMap<String, String> = routes
        .into_iter()
        .map(|(name, url)| (name.to_string(), url.to_string()))
        .collect();
    Arc::new(move |name: String| {
        let resolved = routes.get(&name).cloned();
        Box::pin(async move { resolved.ok_or_else(|| Error::unsupported(format!("resource {name}"))) })
    })
}
