// 集成测试公共模块
//
// 提供模拟翻译服务、假 HTTP 翻译端点以及聊天页面构造工具

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use markup5ever_rcdom::{Handle, NodeData};

use chat_translator::host::{LiveDocument, PreferenceStore, Preferences};
use chat_translator::parsers::html::dom::{descendant_elements, get_node_attr};
use chat_translator::translation::{
    constants, TranslationEngine, TranslationError, TranslationProvider, TranslationResult,
    TranslatorConfig,
};

/// 内存中的翻译服务
///
/// 未预设回复时返回 `"[lang] text"`。
pub struct MockProvider {
    replies: RefCell<HashMap<(String, String), String>>,
    failure: RefCell<Option<TranslationError>>,
    delay: Cell<Duration>,
    calls: RefCell<Vec<(String, String)>>,
}

impl MockProvider {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            replies: RefCell::new(HashMap::new()),
            failure: RefCell::new(None),
            delay: Cell::new(Duration::ZERO),
            calls: RefCell::new(Vec::new()),
        })
    }

    pub fn reply(&self, text: &str, target_language: &str, translated: &str) {
        self.replies.borrow_mut().insert(
            (text.to_string(), target_language.to_string()),
            translated.to_string(),
        );
    }

    /// 之后的所有调用都返回该错误
    pub fn fail_with(&self, error: TranslationError) {
        *self.failure.borrow_mut() = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.borrow_mut() = None;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay.set(delay);
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

#[async_trait(?Send)]
impl TranslationProvider for MockProvider {
    async fn translate(&self, text: &str, target_language: &str) -> TranslationResult<String> {
        self.calls
            .borrow_mut()
            .push((text.to_string(), target_language.to_string()));

        let delay = self.delay.get();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.failure.borrow().clone() {
            return Err(error);
        }

        let key = (text.to_string(), target_language.to_string());
        Ok(self
            .replies
            .borrow()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| format!("[{}] {}", target_language, text)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// 测试用配置：无启动延迟，单次分阶段扫描，关闭周期扫描
pub fn test_config() -> TranslatorConfig {
    TranslatorConfig {
        startup_delay_ms: 0,
        initial_scan_delays_ms: vec![100],
        container_retry_ms: 200,
        rescan_delay_ms: 50,
        periodic_scan_ms: 0,
        ..TranslatorConfig::default()
    }
}

/// 文档、偏好、模拟服务和引擎的组合
pub struct TestEnvironment {
    pub document: Rc<LiveDocument>,
    pub preferences: Rc<PreferenceStore>,
    pub provider: Rc<MockProvider>,
    pub engine: Rc<TranslationEngine>,
}

impl TestEnvironment {
    pub fn new(html: &str, target_language: &str) -> Self {
        Self::with_config(html, target_language, &test_config())
    }

    pub fn with_config(html: &str, target_language: &str, config: &TranslatorConfig) -> Self {
        let document = LiveDocument::parse(html.as_bytes(), "utf-8");
        let preferences = Rc::new(PreferenceStore::in_memory(Preferences {
            target_language: target_language.to_string(),
            enabled: true,
        }));
        let provider = MockProvider::new();
        let engine = Rc::new(
            TranslationEngine::new(preferences.clone(), provider.clone(), config)
                .expect("engine should build"),
        );

        Self {
            document,
            preferences,
            provider,
            engine,
        }
    }

    pub fn by_id(&self, id: &str) -> Handle {
        by_id(self.document.document(), id)
    }
}

/// 本地假翻译端点
///
/// 默认按请求参数回显 `[[["[lang] query","query"]]]`，也可以固定状态码和响应体。
pub struct FakeTranslationServer {
    addr: SocketAddr,
    state: Arc<FakeServerState>,
}

struct FakeServerState {
    hits: AtomicUsize,
    status: Mutex<StatusCode>,
    body: Mutex<Option<String>>,
    queries: Mutex<Vec<HashMap<String, String>>>,
}

impl FakeTranslationServer {
    pub async fn start() -> Self {
        let state = Arc::new(FakeServerState {
            hits: AtomicUsize::new(0),
            status: Mutex::new(StatusCode::OK),
            body: Mutex::new(None),
            queries: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/translate", get(fake_translate))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake server");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake server");
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}/translate", self.addr)
    }

    pub fn config(&self) -> TranslatorConfig {
        TranslatorConfig {
            request_timeout_secs: 5,
            ..TranslatorConfig::with_api_url(&self.url())
        }
    }

    pub fn respond_with(&self, status: u16, body: &str) {
        *self.state.status.lock().unwrap() = StatusCode::from_u16(status).expect("status code");
        *self.state.body.lock().unwrap() = Some(body.to_string());
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<HashMap<String, String>> {
        self.state.queries.lock().unwrap().last().cloned()
    }
}

async fn fake_translate(
    State(state): State<Arc<FakeServerState>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.queries.lock().unwrap().push(params.clone());

    let status = *state.status.lock().unwrap();
    let body = state.body.lock().unwrap().clone().unwrap_or_else(|| {
        let query = params.get("query").cloned().unwrap_or_default();
        let target = params.get("target-language").cloned().unwrap_or_default();
        serde_json::json!([[[format!("[{}] {}", target, query), query]]]).to_string()
    });
    (status, body)
}

/// 一条聊天消息行
pub fn chat_row(id: &str, user: &str, text: &str) -> String {
    format!(
        r#"<div id="{id}" class="chat-line__message" data-a-target="chat-line-message"><span data-a-target="chat-message-username">{user}</span><span class="text-fragment">{text}</span></div>"#
    )
}

/// 聊天页面，容器 id 为 `chat`
pub fn chat_page(rows: &[String]) -> String {
    format!(
        r#"<html><head><title>stream</title></head><body><nav>menu</nav><div id="chat" data-a-target="chat-scrollable-area">{}</div></body></html>"#,
        rows.concat()
    )
}

pub fn by_id(root: &Handle, id: &str) -> Handle {
    descendant_elements(root)
        .into_iter()
        .find(|node| get_node_attr(node, "id").as_deref() == Some(id))
        .unwrap_or_else(|| panic!("no element with id {}", id))
}

/// 消息正文元素
pub fn text_fragment(node: &Handle) -> Handle {
    descendant_elements(node)
        .into_iter()
        .find(|n| get_node_attr(n, "class").as_deref() == Some("text-fragment"))
        .expect("message has a text fragment")
}

/// 正文的直接文本（不含译文标记）
pub fn message_text(node: &Handle) -> String {
    let fragment = text_fragment(node);
    let mut text = String::new();
    for child in fragment.children.borrow().iter() {
        if let NodeData::Text { contents } = &child.data {
            text.push_str(&contents.borrow());
        }
    }
    text
}

pub fn indicator_count(node: &Handle) -> usize {
    descendant_elements(node)
        .iter()
        .filter(|n| get_node_attr(n, "class").as_deref() == Some(constants::INDICATOR_CLASS))
        .count()
}

pub fn provenance(node: &Handle) -> Option<String> {
    get_node_attr(&text_fragment(node), constants::PROVENANCE_ATTR)
}

/// 让出执行权，使已就绪的本地任务跑完
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
