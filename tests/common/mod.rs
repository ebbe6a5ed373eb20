#![allow(dead_code)]

use tokio::runtime::{Builder, Runtime};
use wiremock::{Mock, MockServer, Request};

/// 在獨立 runtime 上執行的 mock server，讓阻塞式的 Provider 可以直接在測試執行緒呼叫。
pub struct MockApi {
    server: Option<MockServer>,
    runtime: Runtime,
}

impl MockApi {
    pub fn start() -> Self {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let server = runtime.block_on(MockServer::start());
        Self {
            server: Some(server),
            runtime,
        }
    }

    fn server(&self) -> &MockServer {
        self.server.as_ref().unwrap()
    }

    pub fn uri(&self) -> String {
        self.server().uri()
    }

    pub fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(self.server()));
    }

    pub fn requests(&self) -> Vec<Request> {
        self.runtime
            .block_on(self.server().received_requests())
            .unwrap_or_default()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|r| r.method.as_str() == method && r.url.path() == path)
            .collect()
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        let _guard = self.runtime.enter();
        drop(self.server.take());
    }
}
