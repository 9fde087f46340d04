//! MCP Server implementation using rmcp
//!
//! The server plays the role of a single browser tab: it holds at most one
//! open [`ToolPage`], and opening another tool closes the current one.

use crate::catalog::{find_tool, find_tool_by_path, ToolDescriptor, TOOLS};
use crate::error::Error;
use crate::identity::{AccountSession, FirebaseIdentity};
use crate::intake::InputFile;
use crate::pipeline::{
    ActionOutcome, PageSettings, PublishedResult, ResultHandle, ResultStore, RoutineSettings,
    Routines, ToolPage, Toolkit,
};
use crate::source::{FileSource, Sandbox, SourceResolver};
use anyhow::Result;
use base64::Engine;
use parking_lot::Mutex;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, service::RequestContext, tool, tool_handler, tool_router, RoleServer,
    ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Security and resource configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directories file paths and output paths are confined to
    pub resource_dirs: Vec<String>,
    /// Allow URLs that resolve to private/reserved IPs (default: false)
    pub allow_private_urls: bool,
    /// Maximum download size in bytes for URL sources (default: 100MB)
    pub max_download_bytes: u64,
    /// Maximum total bytes of live results (default: 512MB)
    pub result_max_bytes: usize,
    /// Maximum number of live results (default: 100)
    pub result_max_entries: usize,
    /// Web API key for the identity service; sign-in is disabled without it
    pub identity_api_key: Option<String>,
    pub page: PageSettings,
    pub routines: RoutineSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            resource_dirs: Vec::new(),
            allow_private_urls: false,
            max_download_bytes: 100 * 1024 * 1024,
            result_max_bytes: 512 * 1024 * 1024,
            result_max_entries: 100,
            identity_api_key: None,
            page: PageSettings::default(),
            routines: RoutineSettings::default(),
        }
    }
}

/// Ziva.pdf MCP server
#[derive(Clone)]
pub struct ZivaServer {
    config: Arc<ServerConfig>,
    store: Arc<ResultStore>,
    resolver: Arc<SourceResolver>,
    routines: Arc<dyn Routines>,
    page: Arc<Mutex<Option<Arc<ToolPage>>>>,
    accounts: Arc<AccountSession>,
    tool_router: ToolRouter<Self>,
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub tool: &'static ToolDescriptor,
    /// False for tools that only show an informational notice
    pub runs_locally: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct OpenToolParams {
    /// Tool id (e.g. "merge-pdf") or route path (e.g. "/merge-pdf")
    pub tool: String,
    /// Files to select on the new page. Resolved before the previous page
    /// closes, so its result handle can be carried over.
    #[serde(default)]
    pub sources: Vec<FileSource>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddFilesParams {
    /// Files to append to the selection, in order
    pub sources: Vec<FileSource>,
    /// Deliver the files as a drag-and-drop instead of a picker selection
    #[serde(default)]
    pub drop: bool,
}

#[derive(Debug, Serialize)]
pub struct AddedFile {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct RunToolParams {
    /// Also save the result to this path
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunToolResult {
    pub tool: &'static str,
    /// published, deferred, failed, ignored or no_selection
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PublishedResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popup: Option<crate::notify::Popup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CredentialsParams {
    pub email: String,
    pub password: String,
}

/// Find a tool by route path, then by id
fn lookup_tool(tool: &str) -> crate::error::Result<&'static ToolDescriptor> {
    match find_tool_by_path(tool) {
        Some(descriptor) => Ok(descriptor),
        None => find_tool(tool),
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn error_json(error: &Error) -> String {
    to_json(&serde_json::json!({ "error": error.client_message() }))
}

const NO_OPEN_TOOL: &str = "No tool is open. Call open_tool first.";

// ============================================================================
// Tool implementations
// ============================================================================

#[tool_router]
impl ZivaServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_resource_dirs(dirs: Vec<String>) -> Self {
        Self::with_config(ServerConfig {
            resource_dirs: dirs,
            ..ServerConfig::default()
        })
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let routines = Arc::new(Toolkit::standard().with_settings(config.routines.clone()));
        let accounts = match &config.identity_api_key {
            Some(key) => AccountSession::new(Arc::new(FirebaseIdentity::new(key.clone()))),
            None => AccountSession::disabled(),
        };
        Self::with_parts(config, routines, accounts)
    }

    /// Assemble a server around explicit routine and identity implementations
    pub fn with_parts(
        config: ServerConfig,
        routines: Arc<dyn Routines>,
        accounts: AccountSession,
    ) -> Self {
        let store = Arc::new(ResultStore::new(
            config.result_max_entries,
            config.result_max_bytes,
        ));
        let resolver = SourceResolver::new(
            Sandbox::new(&config.resource_dirs),
            config.allow_private_urls,
            config.max_download_bytes,
            Arc::clone(&store),
        );
        Self {
            config: Arc::new(config),
            store,
            resolver: Arc::new(resolver),
            routines,
            page: Arc::new(Mutex::new(None)),
            accounts: Arc::new(accounts),
            tool_router: Self::tool_router(),
        }
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    pub fn accounts(&self) -> &Arc<AccountSession> {
        &self.accounts
    }

    /// List the tool catalog
    #[tool(
        description = "List every tool in the catalog with its id, title, description, accepted file types and route path. Tools with runs_locally=false only show an informational notice when run."
    )]
    async fn list_catalog(&self) -> String {
        let entries: Vec<CatalogEntry> = TOOLS
            .iter()
            .map(|tool| CatalogEntry {
                tool,
                runs_locally: !tool.kind.is_deferred(),
            })
            .collect();
        to_json(&serde_json::json!({ "tools": entries }))
    }

    /// Navigate to a tool
    #[tool(
        description = "Open a tool page by id or route path. Closes the currently open tool: its selection is discarded and its result download is revoked. To carry the previous result into the new tool, pass it in sources as {\"result\": \"ziva://results/...\"}; sources are resolved before the previous page closes."
    )]
    async fn open_tool(&self, Parameters(params): Parameters<OpenToolParams>) -> String {
        let descriptor = match lookup_tool(&params.tool) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                tracing::warn!(error = %e, "open_tool failed");
                return error_json(&e);
            }
        };

        let (files, added) = self.resolve_sources(&params.sources).await;
        let page = self.replace_page(descriptor);
        if !files.is_empty() {
            page.pick_files(files);
        }

        to_json(&serde_json::json!({
            "page": page.status(),
            "added": added,
        }))
    }

    /// Append files to the selection
    #[tool(
        description = "Append files to the open tool's selection. Files are never validated on intake. Adding files hides the previous result.

Source format: each element must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\", \"name\": \"scan.png\"}, or {\"result\": \"ziva://results/...\"}"
    )]
    async fn add_files(&self, Parameters(params): Parameters<AddFilesParams>) -> String {
        let Some(page) = self.current_page() else {
            return to_json(&serde_json::json!({ "error": NO_OPEN_TOOL }));
        };

        let (files, report) = self.resolve_sources(&params.sources).await;

        if !files.is_empty() {
            if params.drop {
                page.drag_enter();
                page.drop_files(files);
            } else {
                page.pick_files(files);
            }
        }

        to_json(&serde_json::json!({
            "added": report,
            "selection_count": page.selection_len(),
        }))
    }

    /// Remove every file from the selection
    #[tool(description = "Remove every file from the open tool's selection.")]
    async fn clear_files(&self) -> String {
        match self.current_page() {
            Some(page) => {
                page.clear_files();
                to_json(&page.status())
            }
            None => to_json(&serde_json::json!({ "error": NO_OPEN_TOOL })),
        }
    }

    /// Run the open tool
    #[tool(
        description = "Run the open tool over the current selection. On success the result is published as a resource (ziva://results/<id>) with a suggested filename; it can be fed to another tool as {\"result\": \"<handle>\"}. Optionally saves the result to output_path. Only one run per tool page may be in flight; extra attempts are ignored."
    )]
    async fn run_tool(&self, Parameters(params): Parameters<RunToolParams>) -> String {
        let Some(page) = self.current_page() else {
            return to_json(&serde_json::json!({ "error": NO_OPEN_TOOL }));
        };
        let result = self.process_run_tool(&page, &params).await;
        to_json(&result)
    }

    /// Reset the open tool
    #[tool(
        description = "Start over: clear the selection and revoke the current result download."
    )]
    async fn start_over(&self) -> String {
        match self.current_page() {
            Some(page) => {
                page.start_over();
                to_json(&page.status())
            }
            None => to_json(&serde_json::json!({ "error": NO_OPEN_TOOL })),
        }
    }

    /// Inspect the open tool
    #[tool(
        description = "Show the open tool's state: selected files, busy flag, loading message, current result, toast and popup."
    )]
    async fn session_status(&self) -> String {
        match self.current_page() {
            Some(page) => to_json(&page.status()),
            None => to_json(&serde_json::json!({ "tool": null })),
        }
    }

    /// Close the popup
    #[tool(description = "Dismiss the popup notice, if one is shown.")]
    async fn dismiss_popup(&self) -> String {
        let dismissed = self.current_page().and_then(|page| page.dismiss_popup());
        to_json(&serde_json::json!({ "dismissed": dismissed }))
    }

    /// Create an account
    #[tool(description = "Create an account with email and password, and sign in to it.")]
    async fn sign_up(&self, Parameters(params): Parameters<CredentialsParams>) -> String {
        match self.accounts.sign_up(&params.email, &params.password).await {
            Ok(account) => to_json(&serde_json::json!({ "account": account })),
            Err(e) => {
                tracing::warn!(error = %e, "sign_up failed");
                error_json(&e)
            }
        }
    }

    /// Sign in
    #[tool(description = "Sign in with email and password.")]
    async fn sign_in(&self, Parameters(params): Parameters<CredentialsParams>) -> String {
        match self.accounts.sign_in(&params.email, &params.password).await {
            Ok(account) => to_json(&serde_json::json!({ "account": account })),
            Err(e) => {
                tracing::warn!(error = %e, "sign_in failed");
                error_json(&e)
            }
        }
    }

    /// Sign out
    #[tool(description = "Sign out of the current account.")]
    async fn sign_out(&self) -> String {
        let previous = self.accounts.sign_out();
        to_json(&serde_json::json!({ "signed_out": previous.is_some() }))
    }

    /// Show the signed-in account
    #[tool(description = "Show the signed-in account, if any.")]
    async fn current_account(&self) -> String {
        to_json(&serde_json::json!({ "account": self.accounts.current() }))
    }
}

impl ZivaServer {
    fn current_page(&self) -> Option<Arc<ToolPage>> {
        self.page.lock().clone()
    }

    /// Resolve sources in order; failures are reported per source and skipped
    async fn resolve_sources(&self, sources: &[FileSource]) -> (Vec<InputFile>, Vec<AddedFile>) {
        let mut files = Vec::new();
        let mut report = Vec::with_capacity(sources.len());
        for source in sources {
            match self.resolver.resolve(source).await {
                Ok(file) => {
                    report.push(AddedFile {
                        source: source.label(),
                        name: Some(file.name.clone()),
                        size: Some(file.size()),
                        error: None,
                    });
                    files.push(file);
                }
                Err(e) => {
                    tracing::warn!(source = %source.label(), error = %e, "could not resolve source");
                    report.push(AddedFile {
                        source: source.label(),
                        name: None,
                        size: None,
                        error: Some(e.client_message()),
                    });
                }
            }
        }
        (files, report)
    }

    fn process_open_tool(&self, tool: &str) -> crate::error::Result<Arc<ToolPage>> {
        Ok(self.replace_page(lookup_tool(tool)?))
    }

    /// Replace the open page. The previous page releases its result when
    /// its last reference goes away.
    fn replace_page(&self, descriptor: &'static ToolDescriptor) -> Arc<ToolPage> {
        let page = Arc::new(ToolPage::new(
            descriptor,
            Arc::clone(&self.routines),
            Arc::clone(&self.store),
            self.config.page.clone(),
        ));
        let previous = self.page.lock().replace(Arc::clone(&page));
        if let Some(previous) = previous {
            tracing::info!(from = previous.tool().id, to = descriptor.id, "switching tool");
        }
        page
    }

    async fn process_run_tool(&self, page: &ToolPage, params: &RunToolParams) -> RunToolResult {
        let mut response = RunToolResult {
            tool: page.tool().id,
            status: "",
            result: None,
            output_path: None,
            popup: None,
            message: None,
            error: None,
        };

        match page.trigger().await {
            ActionOutcome::NoSelection => {
                response.status = "no_selection";
                response.message = Some("Select at least one file first.".to_string());
            }
            ActionOutcome::Ignored => {
                response.status = "ignored";
                response.message = Some("A run is already in progress.".to_string());
            }
            ActionOutcome::Deferred(popup) => {
                response.status = "deferred";
                response.popup = Some(popup);
            }
            ActionOutcome::Failed { message } => {
                response.status = "failed";
                response.error = Some(message);
            }
            ActionOutcome::Published(result) => {
                response.status = "published";
                response.message = page.toast().map(|t| t.message);
                match self.write_output(&params.output_path, result.data()) {
                    Ok(path) => response.output_path = path,
                    Err(e) => {
                        tracing::warn!(error = %e, "could not save result");
                        response.error = Some(e.client_message());
                    }
                }
                response.result = Some(result);
            }
        }
        response
    }

    /// Write output data to a file path, with sandbox validation
    fn write_output(
        &self,
        output_path: &Option<String>,
        data: &[u8],
    ) -> crate::error::Result<Option<String>> {
        let Some(path_str) = output_path else {
            return Ok(None);
        };
        self.resolver.sandbox().check_write(path_str)?;

        let path = Path::new(path_str);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, data)?;
        Ok(Some(path_str.clone()))
    }

    fn read_result(&self, uri: &str) -> crate::error::Result<ReadResourceResult> {
        let handle = ResultHandle::parse(uri)?;
        let result = self.store.fetch(&handle)?;
        let blob = base64::engine::general_purpose::STANDARD.encode(result.data());
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::BlobResourceContents {
                uri: handle.uri(),
                mime_type: Some(result.mime.to_string()),
                blob,
                meta: Default::default(),
            }],
        })
    }
}

impl Default for ZivaServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for ZivaServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Ziva.pdf merges, splits, rotates, watermarks and compresses PDFs and converts \
                 between images and PDFs. Open a tool, add files, then run it. Results are \
                 exposed as ziva://results/ resources until replaced or revoked."
                    .into(),
            ),
        }
    }

    /// List the live results
    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        let resources = self
            .store
            .list()
            .into_iter()
            .map(|result| {
                let mut resource = RawResource::new(result.handle.uri(), result.filename.clone());
                resource.mime_type = Some(result.mime.to_string());
                resource.description = Some(format!(
                    "{} ({} bytes), published {}",
                    result.filename,
                    result.size,
                    result.published_at.to_rfc3339()
                ));
                resource.size = u32::try_from(result.size).ok();
                Annotated {
                    raw: resource,
                    annotations: None,
                }
            })
            .collect();

        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
            meta: Default::default(),
        })
    }

    /// Download a result
    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        self.read_result(&request.uri).map_err(|e| {
            tracing::warn!(uri = %request.uri, error = %e, "read_resource failed");
            ErrorData::invalid_params(e.client_message(), None)
        })
    }
}

/// Run the MCP server without resource directories
pub async fn run_server() -> Result<()> {
    run_server_with_config(ServerConfig::default()).await
}

/// Run the MCP server with specified resource directories
pub async fn run_server_with_dirs(resource_dirs: Vec<String>) -> Result<()> {
    run_server_with_config(ServerConfig {
        resource_dirs,
        ..ServerConfig::default()
    })
    .await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig) -> Result<()> {
    let server = ZivaServer::with_config(config);

    tracing::info!("Ziva.pdf server ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}
