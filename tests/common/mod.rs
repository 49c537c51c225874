#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use suitekit::app::{ResourceGuard, ResourceKind, PersistencePool};
use suitekit::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Handler result; the prelude's `Result` is the one-parameter suite alias
pub type HttpResult<T> = std::result::Result<T, (StatusCode, String)>;

#[derive(Instrumentable)]
#[instrumentable(kind = "repository")]
pub struct UserRepository {
    #[methods]
    methods: MethodTable<Self>,
    names: Vec<String>,
}

impl UserRepository {
    pub fn new(names: &[&str]) -> Self {
        let repo = Self {
            methods: MethodTable::new(),
            names: names.iter().map(|name| name.to_string()).collect(),
        };
        repo.methods
            .define_sync("find_name", |repo: &Self, id: u32| {
                repo.names
                    .get(id as usize)
                    .cloned()
                    .ok_or_else(|| MethodError::msg(format!("user {id} not found")))
            })
            .define_async("count", |repo: Arc<Self>, _: ()| async move {
                tokio::task::yield_now().await;
                Ok(repo.names.len())
            });
        repo
    }

    pub fn find_name(&self, id: u32) -> MethodResult<String> {
        self.methods.call_sync(self, "find_name", id)
    }

    pub async fn count(self: Arc<Self>) -> MethodResult<usize> {
        self.methods.call(&self, "count", ()).await
    }
}

#[derive(Instrumentable)]
#[instrumentable(kind = "service")]
pub struct UserService {
    methods: MethodTable<Self>,
    repository: Arc<UserRepository>,
}

impl UserService {
    pub fn new(repository: Arc<UserRepository>) -> Self {
        let service = Self {
            methods: MethodTable::new(),
            repository,
        };
        service
            .methods
            .define_async("greet", |service: Arc<Self>, id: u32| async move {
                let name = service.repository.find_name(id)?;
                Ok(format!("Hello, {name}"))
            });
        service
    }

    pub async fn greet(self: Arc<Self>, id: u32) -> MethodResult<String> {
        self.methods.call(&self, "greet", id).await
    }
}

#[derive(Injectable)]
pub struct UserController {
    users: Arc<UserService>,
}

impl UserController {
    pub async fn greeting(&self, id: u32) -> HttpResult<String> {
        Arc::clone(&self.users)
            .greet(id)
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
    }
}

#[derive(Clone)]
struct AppState {
    container: Arc<Container>,
}

impl HasContainer for AppState {
    fn get_container(&self) -> &Container {
        &self.container
    }
}

async fn greeting(
    Inject(controller): Inject<UserController>,
    Path(id): Path<u32>,
) -> HttpResult<String> {
    controller.greeting(id).await
}

async fn count(State(state): State<AppState>) -> HttpResult<String> {
    let repository = state
        .container
        .get::<UserRepository>()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    repository
        .count()
        .await
        .map(|n| n.to_string())
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Connection pool stand-in that counts as a live resource until closed
pub struct DemoPool {
    closed: AtomicBool,
    guard: Mutex<Option<ResourceGuard>>,
}

impl DemoPool {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistencePool for DemoPool {
    fn name(&self) -> &str {
        "demo-pool"
    }

    async fn close(&self) -> suitekit::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.guard.lock().unwrap().take();
        Ok(())
    }
}

/// Demo application: users API on an ephemeral port
#[derive(Default, Clone)]
pub struct DemoApp {
    /// Bind the listener, then fail before returning a view
    pub fail_boot: bool,
    /// Skip the wiring readiness signal
    pub never_ready: bool,
}

impl DemoApp {
    pub fn failing() -> Self {
        Self {
            fail_boot: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Application for DemoApp {
    async fn start(&self, ctx: BootContext) -> suitekit::Result<AppView> {
        let names: Vec<String> = ctx
            .config()
            .pointer("/users")
            .and_then(|users| serde_json::from_value(users.clone()).ok())
            .unwrap_or_else(|| vec!["alice".to_string(), "bob".to_string()]);
        let names: Vec<&str> = names.iter().map(String::as_str).collect();

        let repository = Arc::new(UserRepository::new(&names));
        let container = Arc::new(
            ContainerBuilder::new()
                .register_arc(Arc::clone(&repository))
                .register(UserService::new(repository))
                .provide::<UserController>()?
                .build(),
        );

        let pool = Arc::new(DemoPool {
            closed: AtomicBool::new(false),
            guard: Mutex::new(Some(ctx.resources().track(ResourceKind::Pool, "demo-pool"))),
        });
        container.set_arc(Arc::clone(&pool));
        ctx.readiness().signal(PERSISTENCE_READY);

        let router = Router::new()
            .route("/users/{id}/greeting", get(greeting))
            .route("/users/count", get(count))
            .with_state(AppState {
                container: Arc::clone(&container),
            });
        let addr: SocketAddr = ([127, 0, 0, 1], 0).into();
        let listener = ListenerHandle::serve(router, addr, ctx.resources()).await?;

        if self.fail_boot {
            pool.close().await?;
            return Err(SuiteError::boot_failed("database unreachable"));
        }

        if !self.never_ready {
            let readiness = ctx.readiness().clone();
            ctx.resources().spawn("wiring", async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                readiness.signal(WIRING_COMPLETE);
            });
        }

        Ok(ctx
            .view(container)
            .listener(listener)
            .persistence(pool)
            .build())
    }
}

pub fn settings() -> HarnessSettings {
    HarnessSettings::default()
        .lingering_policy(LingeringPolicy::Warn)
        .readiness_timeout(Duration::from_secs(5))
}

pub fn framework(app: DemoApp) -> TestFramework {
    suitekit::logging::init_test_logging();
    TestFramework::builder(app)
        .settings(settings())
        .build()
        .expect("framework builds")
}

/// Minimal HTTP/1.1 GET; returns status code and body
pub async fn http_get(addr: SocketAddr, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.expect("write");

    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read");

    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}
