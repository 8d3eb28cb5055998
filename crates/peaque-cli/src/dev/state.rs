//! Shared development-server state.
//!
//! Route trees are replaced atomically (`Arc` swap under a short write
//! lock) so in-flight requests keep the tree they started with. The
//! transform cache serializes duplicate producers per key on its own.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::info;

use peaque_build::Bundler;
use peaque_fs::FileSystem;
use peaque_router::{api_rules, build_route_tree, page_rules, GuardConfig, RouteNode};
use peaque_transform::{AliasMap, TransformCache};

use crate::dev::HmrFrame;
use crate::error::Result;
use crate::runtime::ModuleRuntime;

/// Long-lived dev-server state; dropped on shutdown.
pub struct DevState {
    pub fs: Arc<dyn FileSystem>,
    pub bundler: Arc<dyn Bundler>,
    pub runtime: Arc<dyn ModuleRuntime>,
    pub project_root: PathBuf,
    pub aliases: AliasMap,
    pub guard: GuardConfig,
    pub cache: TransformCache,
    pub full_stack_traces: bool,

    page_router: RwLock<Arc<RouteNode>>,
    api_router: RwLock<Arc<RouteNode>>,
    global_middleware: RwLock<Option<String>>,
    hmr: broadcast::Sender<HmrFrame>,
}

pub type SharedDevState = Arc<DevState>;

impl DevState {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        bundler: Arc<dyn Bundler>,
        runtime: Arc<dyn ModuleRuntime>,
        project_root: PathBuf,
        aliases: AliasMap,
        cache: TransformCache,
    ) -> Self {
        let (hmr, _) = broadcast::channel(256);
        DevState {
            fs,
            bundler,
            runtime,
            project_root,
            aliases,
            guard: GuardConfig::new(),
            cache,
            full_stack_traces: false,
            page_router: RwLock::new(Arc::new(RouteNode::new())),
            api_router: RwLock::new(Arc::new(RouteNode::new())),
            global_middleware: RwLock::new(None),
            hmr,
        }
    }

    /// Project-relative module path of `src/middleware.ts`, when present.
    pub fn global_middleware_path(&self) -> Option<String> {
        self.global_middleware.read().clone()
    }

    pub fn set_global_middleware(&self, path: Option<String>) {
        *self.global_middleware.write() = path;
    }

    /// Current page router snapshot.
    pub fn page_router(&self) -> Arc<RouteNode> {
        Arc::clone(&self.page_router.read())
    }

    /// Current API router snapshot.
    pub fn api_router(&self) -> Arc<RouteNode> {
        Arc::clone(&self.api_router.read())
    }

    /// Rebuild the page router from disk and swap it in.
    pub fn rebuild_page_router(&self) -> Result<()> {
        let tree = build_route_tree(
            self.fs.as_ref(),
            &self.project_root.join("src/pages"),
            &page_rules(),
        )?;
        *self.page_router.write() = Arc::new(tree);
        info!("page router rebuilt");
        Ok(())
    }

    /// Rebuild the API router from disk and swap it in.
    pub fn rebuild_api_router(&self) -> Result<()> {
        let tree = build_route_tree(
            self.fs.as_ref(),
            &self.project_root.join("src/api"),
            &api_rules(),
        )?;
        *self.api_router.write() = Arc::new(tree);
        info!("api router rebuilt");
        Ok(())
    }

    /// Subscribe one HMR peer.
    pub fn subscribe_hmr(&self) -> broadcast::Receiver<HmrFrame> {
        self.hmr.subscribe()
    }

    /// Broadcast one HMR frame to every connected peer.
    pub fn broadcast_hmr(&self, frame: HmrFrame) {
        // No peers is fine; send only fails when nobody listens.
        let _ = self.hmr.send(frame);
    }

    pub fn hmr_peer_count(&self) -> usize {
        self.hmr.receiver_count()
    }

    /// Project-relative form of an absolute path under the root.
    pub fn project_relative(&self, path: &std::path::Path) -> String {
        let root = peaque_fs::normalize_path(&self.project_root);
        let path = peaque_fs::normalize_path(path);
        path.strip_prefix(&root)
            .map(|rest| rest.trim_start_matches('/').to_string())
            .unwrap_or(path)
    }

    /// [`DevState::project_relative`] for string paths from route trees.
    pub fn project_relative_str(&self, path: &str) -> String {
        self.project_relative(std::path::Path::new(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MemoryRuntime;
    use peaque_build::MemoryBundler;
    use peaque_fs::MemoryFileSystem;

    fn state(fs: Arc<MemoryFileSystem>) -> DevState {
        let cache = TransformCache::load(fs.clone(), "/app/.peaque-cache");
        DevState::new(
            fs,
            Arc::new(MemoryBundler::new()),
            Arc::new(MemoryRuntime::new()),
            PathBuf::from("/app"),
            AliasMap::new(),
            cache,
        )
    }

    #[test]
    fn router_swap_is_atomic_for_held_snapshots() {
        let fs = Arc::new(MemoryFileSystem::with_files([("/app/src/pages/page.tsx", "")]));
        let state = state(fs.clone());
        state.rebuild_page_router().unwrap();

        let before = state.page_router();
        assert!(before.accept);

        fs.write(std::path::Path::new("/app/src/pages/about/page.tsx"), b"").unwrap();
        state.rebuild_page_router().unwrap();

        // The held snapshot still has no `/about`; the fresh one does.
        assert!(!before.static_children.contains_key("about"));
        assert!(state.page_router().static_children.contains_key("about"));
    }

    #[test]
    fn hmr_broadcast_reaches_subscribers_in_order() {
        let fs = Arc::new(MemoryFileSystem::new());
        let state = state(fs);
        let mut rx = state.subscribe_hmr();

        state.broadcast_hmr(HmrFrame::change("a"));
        state.broadcast_hmr(HmrFrame::change("b"));

        assert_eq!(rx.try_recv().unwrap().data.path, "a");
        assert_eq!(rx.try_recv().unwrap().data.path, "b");
    }

    #[test]
    fn project_relative_strips_the_root() {
        let fs = Arc::new(MemoryFileSystem::new());
        let state = state(fs);
        assert_eq!(
            state.project_relative(std::path::Path::new("/app/src/pages/page.tsx")),
            "src/pages/page.tsx"
        );
    }
}
