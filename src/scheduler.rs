// ============================================================================
// FRAME SCHEDULER: coalesce render work to one pass per frame
// ============================================================================

/// Work a state change asks the host to do on the next frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameTask {
    /// Rebuild the preview scene (geometry, crops, frame).
    FullRender,
    /// Re-resolve transforms of the existing scene only.
    StyleUpdate,
    /// Refresh panel readouts (dimension fields, swatches).
    SidebarRefresh,
}

/// Pending-set of [`FrameTask`]s, drained once per frame.
///
/// Scheduling a task that is already pending does nothing, and a pending
/// full render absorbs any style update.
#[derive(Clone, Debug, Default)]
pub struct FrameScheduler {
    full_render: bool,
    style_update: bool,
    sidebar_refresh: bool,
    frames_drained: u64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task.  Returns `true` when it was not already pending.
    pub fn schedule(&mut self, task: FrameTask) -> bool {
        let slot = match task {
            FrameTask::FullRender => &mut self.full_render,
            FrameTask::StyleUpdate => {
                if self.full_render {
                    return false;
                }
                &mut self.style_update
            }
            FrameTask::SidebarRefresh => &mut self.sidebar_refresh,
        };
        let fresh = !*slot;
        *slot = true;
        fresh
    }

    pub fn is_idle(&self) -> bool {
        !(self.full_render || self.style_update || self.sidebar_refresh)
    }

    /// Take this frame's work: at most one render task, then the sidebar refresh.
    pub fn drain(&mut self) -> Vec<FrameTask> {
        let mut out = Vec::with_capacity(2);
        if self.full_render {
            out.push(FrameTask::FullRender);
        } else if self.style_update {
            out.push(FrameTask::StyleUpdate);
        }
        if self.sidebar_refresh {
            out.push(FrameTask::SidebarRefresh);
        }
        self.full_render = false;
        self.style_update = false;
        self.sidebar_refresh = false;
        if !out.is_empty() {
            self.frames_drained += 1;
        }
        out
    }

    /// Frames that carried any work.
    pub fn frames_drained(&self) -> u64 {
        self.frames_drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_schedules_coalesce() {
        let mut s = FrameScheduler::new();
        assert!(s.schedule(FrameTask::StyleUpdate));
        for _ in 0..50 {
            assert!(!s.schedule(FrameTask::StyleUpdate));
        }
        assert_eq!(s.drain(), vec![FrameTask::StyleUpdate]);
        assert!(s.is_idle());
        assert!(s.drain().is_empty());
        assert_eq!(s.frames_drained(), 1);
    }

    #[test]
    fn full_render_absorbs_style_update() {
        let mut s = FrameScheduler::new();
        s.schedule(FrameTask::StyleUpdate);
        s.schedule(FrameTask::FullRender);
        assert!(!s.schedule(FrameTask::StyleUpdate));
        s.schedule(FrameTask::SidebarRefresh);
        assert_eq!(s.drain(), vec![FrameTask::FullRender, FrameTask::SidebarRefresh]);
    }

    #[test]
    fn tasks_after_drain_start_a_new_frame() {
        let mut s = FrameScheduler::new();
        s.schedule(FrameTask::FullRender);
        s.drain();
        assert!(s.schedule(FrameTask::FullRender));
        assert!(!s.is_idle());
        assert_eq!(s.drain(), vec![FrameTask::FullRender]);
    }
}
