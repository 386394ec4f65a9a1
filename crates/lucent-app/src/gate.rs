//! Compute dispatch pacing.
//!
//! The CPU never submits a new compute job while the previous one is still
//! executing: every frame waits on the compute fence, resets it, and only
//! then resubmits the persistent compute command buffer.

use ash::vk;
use lucent_gpu::command::{submit_command_buffers, CommandPool};
use lucent_gpu::context::DeviceContext;
use lucent_gpu::sync::{create_fence, reset_fence, wait_for_fence};
use thiserror::Error;

/// A violation of the wait-reset-submit protocol.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PacingError {
    /// A second dispatch was submitted while one was already in flight.
    #[error("compute dispatch submitted while the previous one is still in flight")]
    SubmitWhileInFlight,

    /// The fence was waited and reset twice without a submission between.
    #[error("compute fence reset twice without an intervening submission")]
    DoubleReset,

    /// A dispatch was submitted against a fence that was never reset.
    #[error("compute dispatch submitted without waiting on and resetting the fence")]
    SubmitWithoutReset,
}

/// CPU-side model of the compute fence protocol.
///
/// The fence starts signaled, so the first frame's wait returns
/// immediately; from then on every wait-reset pairs with exactly one
/// submission and at most one dispatch is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    /// Fence signaled (initial state, or dispatch known complete).
    Signaled,
    /// Fence waited and reset; ready for exactly one submission.
    Reset,
    /// A dispatch is in flight and will signal the fence.
    InFlight,
}

/// Pure ledger tracking the protocol; the gate consults it before every
/// driver call so violations surface as errors, not driver misbehavior.
#[derive(Debug)]
pub struct PacingLedger {
    state: FenceState,
    waits: u64,
    submits: u64,
}

impl PacingLedger {
    /// New ledger over a signaled fence.
    pub fn new() -> Self {
        Self {
            state: FenceState::Signaled,
            waits: 0,
            submits: 0,
        }
    }

    /// Record a wait-and-reset. Blocks on an in-flight dispatch; a reset
    /// with nothing submitted and nothing signaled would deadlock.
    pub fn record_wait_reset(&mut self) -> Result<(), PacingError> {
        match self.state {
            FenceState::Signaled | FenceState::InFlight => {
                self.state = FenceState::Reset;
                self.waits += 1;
                Ok(())
            }
            FenceState::Reset => Err(PacingError::DoubleReset),
        }
    }

    /// Record a submission that signals the fence.
    pub fn record_submit(&mut self) -> Result<(), PacingError> {
        match self.state {
            FenceState::Reset => {
                self.state = FenceState::InFlight;
                self.submits += 1;
                Ok(())
            }
            FenceState::InFlight => Err(PacingError::SubmitWhileInFlight),
            FenceState::Signaled => Err(PacingError::SubmitWithoutReset),
        }
    }

    /// Total wait-resets recorded.
    pub fn waits(&self) -> u64 {
        self.waits
    }

    /// Total submissions recorded.
    pub fn submits(&self) -> u64 {
        self.submits
    }
}

impl Default for PacingLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// The compute queue's pool, persistent command buffer, and pacing fence.
pub struct ComputeGate {
    pool: CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    ledger: PacingLedger,
}

impl ComputeGate {
    /// Create the gate on the context's compute queue family.
    ///
    /// # Safety
    /// The context must be valid.
    pub unsafe fn new(ctx: &DeviceContext) -> anyhow::Result<Self> {
        let device = ctx.device();
        let pool = CommandPool::new(
            device,
            ctx.compute_queue_family(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let command_buffer = pool.allocate_command_buffer(device)?;
        let fence = create_fence(device, true)?;

        Ok(Self {
            pool,
            command_buffer,
            fence,
            ledger: PacingLedger::new(),
        })
    }

    /// The persistent compute command buffer.
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Block until the previous dispatch completes, then reset the fence.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn wait_and_reset(&mut self, device: &ash::Device) -> anyhow::Result<()> {
        self.ledger.record_wait_reset()?;
        wait_for_fence(device, self.fence, u64::MAX)?;
        reset_fence(device, self.fence)?;
        Ok(())
    }

    /// Submit the compute command buffer, signaling the fence on completion.
    ///
    /// The wait list is empty: pacing comes purely from the fence.
    ///
    /// # Safety
    /// The device and queue must be valid and the buffer recorded.
    pub unsafe fn submit(&mut self, device: &ash::Device, queue: vk::Queue) -> anyhow::Result<()> {
        self.ledger.record_submit()?;
        submit_command_buffers(
            device,
            queue,
            &[self.command_buffer],
            &[],
            &[],
            &[],
            self.fence,
        )?;
        Ok(())
    }

    /// Destroy the fence and pool.
    ///
    /// # Safety
    /// The device must be valid and no dispatch may be pending.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_fence(self.fence, None);
        self.pool.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_wait_reset_per_submission_across_frames() {
        let mut ledger = PacingLedger::new();

        for _ in 0..100 {
            ledger.record_wait_reset().unwrap();
            ledger.record_submit().unwrap();
        }

        assert_eq!(ledger.waits(), 100);
        assert_eq!(ledger.submits(), 100);
    }

    #[test]
    fn never_more_than_one_dispatch_in_flight() {
        let mut ledger = PacingLedger::new();
        ledger.record_wait_reset().unwrap();
        ledger.record_submit().unwrap();

        assert_eq!(
            ledger.record_submit(),
            Err(PacingError::SubmitWhileInFlight)
        );
    }

    #[test]
    fn double_reset_is_rejected() {
        let mut ledger = PacingLedger::new();
        ledger.record_wait_reset().unwrap();

        assert_eq!(ledger.record_wait_reset(), Err(PacingError::DoubleReset));
    }

    #[test]
    fn submit_against_signaled_fence_is_rejected() {
        let mut ledger = PacingLedger::new();

        assert_eq!(ledger.record_submit(), Err(PacingError::SubmitWithoutReset));
    }
}
