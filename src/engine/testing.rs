//! ### English
//! In-memory compositor and producer doubles shared by the unit tests.
//!
//! ### 中文
//! 单元测试共用的内存版合成器与生产者替身。

use std::collections::{HashMap, HashSet};
use std::ffi::{CStr, c_void};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::{Arc, Mutex};

use dpi::PhysicalSize;

use crate::engine::error::PresentError;
use crate::engine::fence::ScopedFd;
use crate::engine::platform::{
    BufferHandle, CommitCallback, CompleteCallback, PlatformCapabilities, SurfaceControlBackend,
    SurfaceHandle, SurfaceOp, SurfaceStats, TransactionBatch, TransactionStats, Visibility,
    WindowHandle,
};
use crate::engine::renderer::ViewBackend;
use crate::engine::surface::ExportedBuffer;

/// ### English
/// Returns `(fence, writer)`: the fence reads as unsignaled until a byte is written.
///
/// ### 中文
/// 返回 `(fence, writer)`：在写入一个字节之前 fence 处于未 signal 状态。
pub fn pipe_fence() -> (ScopedFd, OwnedFd) {
    let mut fds = [-1; 2];
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(ret, 0, "pipe() failed");
    unsafe { (ScopedFd::from_raw(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
}

pub fn signal(writer: &OwnedFd) {
    let written = unsafe { libc::write(writer.as_raw_fd(), [1u8].as_ptr().cast(), 1) };
    assert_eq!(written, 1);
}

/// ### English
/// Whether the read end of the pipe behind `writer` was closed (writing fails with `EPIPE`).
///
/// ### 中文
/// `writer` 对应管道的读端是否已关闭（写入以 `EPIPE` 失败）。
pub fn reader_closed(writer: &OwnedFd) -> bool {
    let written = unsafe { libc::write(writer.as_raw_fd(), [1u8].as_ptr().cast(), 1) };
    written == -1
}

fn fake_ptr(id: usize) -> *mut c_void {
    (0x1000 + id * 0x10) as *mut c_void
}

/// ### English
/// Comparable view of a recorded [`SurfaceOp`]; fences collapse to "present or not".
///
/// ### 中文
/// 记录下来的 [`SurfaceOp`] 的可比较视图；fence 只保留“是否存在”。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppliedOp {
    Visibility(SurfaceHandle, Visibility),
    ZOrder(SurfaceHandle, i32),
    Buffer(SurfaceHandle, BufferHandle, bool),
    Reparent(SurfaceHandle, Option<SurfaceHandle>),
}

struct AppliedTransaction {
    ops: Vec<AppliedOp>,
    on_commit: Option<CommitCallback>,
    on_complete: Option<CompleteCallback>,
    had_commit: bool,
    committed: bool,
}

#[derive(Default)]
struct FakeState {
    next_id: usize,
    buffers: HashMap<BufferHandle, (PhysicalSize<u32>, i64)>,
    surfaces: HashSet<SurfaceHandle>,
    fail_surface_creation: bool,
    applied: Vec<AppliedTransaction>,
}

/// ### English
/// Records every transaction and only fires callbacks when a test asks for it.
///
/// ### 中文
/// 记录每个事务，仅在测试显式要求时触发回调。
pub struct FakeBackend {
    capabilities: Mutex<PlatformCapabilities>,
    state: Mutex<FakeState>,
    window: WindowHandle,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Self::with_capabilities(PlatformCapabilities {
            commit_callback: true,
        })
    }

    pub fn with_capabilities(capabilities: PlatformCapabilities) -> Arc<Self> {
        Arc::new(Self {
            capabilities: Mutex::new(capabilities),
            state: Mutex::new(FakeState::default()),
            window: WindowHandle::from_raw(fake_ptr(0xFFFF)).unwrap(),
        })
    }

    pub fn window(&self) -> WindowHandle {
        self.window
    }

    pub fn fail_surface_creation(&self, fail: bool) {
        self.state.lock().unwrap().fail_surface_creation = fail;
    }

    pub fn new_buffer(&self, width: u32, height: u32) -> BufferHandle {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let handle = BufferHandle::from_raw(fake_ptr(state.next_id)).unwrap();
        state
            .buffers
            .insert(handle, (PhysicalSize::new(width, height), 0));
        handle
    }

    pub fn buffer_refs(&self, handle: BufferHandle) -> i64 {
        self.state.lock().unwrap().buffers[&handle].1
    }

    pub fn surface_alive(&self, handle: SurfaceHandle) -> bool {
        self.state.lock().unwrap().surfaces.contains(&handle)
    }

    pub fn applied_count(&self) -> usize {
        self.state.lock().unwrap().applied.len()
    }

    pub fn applied_ops(&self, index: usize) -> Vec<AppliedOp> {
        self.state.lock().unwrap().applied[index].ops.clone()
    }

    /// ### English
    /// Buffer attached by transaction `index`, if any.
    ///
    /// ### 中文
    /// 第 `index` 个事务挂载的 buffer（若有）。
    pub fn applied_buffer(&self, index: usize) -> Option<BufferHandle> {
        self.state.lock().unwrap().applied[index]
            .ops
            .iter()
            .find_map(|op| match op {
                AppliedOp::Buffer(_, buffer, _) => Some(*buffer),
                _ => None,
            })
    }

    pub fn applied_has_fence(&self, index: usize) -> bool {
        self.state.lock().unwrap().applied[index]
            .ops
            .iter()
            .any(|op| matches!(op, AppliedOp::Buffer(_, _, true)))
    }

    pub fn applied_has_commit_callback(&self, index: usize) -> bool {
        self.state.lock().unwrap().applied[index].had_commit
    }

    /// ### English
    /// Applied transactions that requested a commit callback which has not fired yet.
    ///
    /// ### 中文
    /// 已 apply、请求了 commit 回调但回调尚未触发的事务数量。
    pub fn uncommitted(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .applied
            .iter()
            .filter(|tx| tx.had_commit && !tx.committed)
            .count()
    }

    pub fn fire_commit(&self, index: usize) {
        let callback = {
            let mut state = self.state.lock().unwrap();
            let tx = &mut state.applied[index];
            tx.committed = true;
            tx.on_commit.take()
        };
        if let Some(callback) = callback {
            callback();
        }
    }

    pub fn fire_complete(&self, index: usize, surfaces: Vec<SurfaceStats>) {
        let callback = self.state.lock().unwrap().applied[index].on_complete.take();
        if let Some(callback) = callback {
            callback(TransactionStats { surfaces });
        }
    }
}

impl SurfaceControlBackend for FakeBackend {
    fn capabilities(&self) -> PlatformCapabilities {
        *self.capabilities.lock().unwrap()
    }

    fn create_surface(
        &self,
        _parent: WindowHandle,
        debug_name: &CStr,
    ) -> Result<SurfaceHandle, PresentError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_surface_creation {
            return Err(PresentError::SurfaceCreation(
                debug_name.to_string_lossy().into_owned(),
            ));
        }
        state.next_id += 1;
        let handle = SurfaceHandle::from_raw(fake_ptr(state.next_id)).unwrap();
        state.surfaces.insert(handle);
        Ok(handle)
    }

    fn release_surface(&self, surface: SurfaceHandle) {
        let removed = self.state.lock().unwrap().surfaces.remove(&surface);
        assert!(removed, "surface released twice");
    }

    fn acquire_buffer(&self, buffer: BufferHandle) {
        self.state
            .lock()
            .unwrap()
            .buffers
            .get_mut(&buffer)
            .expect("unknown buffer")
            .1 += 1;
    }

    fn release_buffer(&self, buffer: BufferHandle) {
        let mut state = self.state.lock().unwrap();
        let refs = &mut state.buffers.get_mut(&buffer).expect("unknown buffer").1;
        *refs -= 1;
        assert!(*refs >= 0, "buffer released more often than acquired");
    }

    fn describe_buffer(&self, buffer: BufferHandle) -> PhysicalSize<u32> {
        self.state.lock().unwrap().buffers[&buffer].0
    }

    fn apply_transaction(&self, batch: TransactionBatch) {
        let ops = batch
            .ops
            .into_iter()
            .map(|op| match op {
                SurfaceOp::SetVisibility {
                    surface,
                    visibility,
                } => AppliedOp::Visibility(surface, visibility),
                SurfaceOp::SetZOrder { surface, z_order } => AppliedOp::ZOrder(surface, z_order),
                SurfaceOp::SetBuffer {
                    surface,
                    buffer,
                    acquire_fence,
                } => AppliedOp::Buffer(surface, buffer, acquire_fence.is_some()),
                SurfaceOp::Reparent { surface, parent } => AppliedOp::Reparent(surface, parent),
            })
            .collect();
        let had_commit = batch.on_commit.is_some();
        self.state.lock().unwrap().applied.push(AppliedTransaction {
            ops,
            on_commit: batch.on_commit,
            on_complete: batch.on_complete,
            had_commit,
            committed: false,
        });
    }
}

/// ### English
/// Producer double: records released buffers and frame-complete notifications.
///
/// ### 中文
/// 生产者替身：记录被交还的 buffer 与 frame-complete 通知。
#[derive(Default)]
pub struct FakeProducer {
    released: Mutex<Vec<(BufferHandle, bool)>>,
    frames_completed: Mutex<usize>,
}

impl FakeProducer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// ### English
    /// Released buffers in release order.
    ///
    /// ### 中文
    /// 按交还顺序排列的 buffer。
    pub fn released(&self) -> Vec<BufferHandle> {
        self.released
            .lock()
            .unwrap()
            .iter()
            .map(|(handle, _)| *handle)
            .collect()
    }

    pub fn released_with_fence(&self) -> Vec<(BufferHandle, bool)> {
        self.released.lock().unwrap().clone()
    }

    pub fn frames_completed(&self) -> usize {
        *self.frames_completed.lock().unwrap()
    }
}

impl ViewBackend for FakeProducer {
    fn release_buffer(&self, buffer: &ExportedBuffer, release_fence: Option<ScopedFd>) {
        self.released
            .lock()
            .unwrap()
            .push((buffer.handle(), release_fence.is_some()));
    }

    fn frame_complete(&self) {
        *self.frames_completed.lock().unwrap() += 1;
    }
}
