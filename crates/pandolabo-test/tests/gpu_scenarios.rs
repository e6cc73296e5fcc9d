//! GPU-backed checks of the command and synchronization layer.
//!
//! Every test returns early unless `PANDOLABO_ENABLE_GPU_TESTS=1`.

use std::time::Duration;

use pandolabo_core::constants::WAIT_FOREVER;
use pandolabo_core::{Error, ErrorKind};
use pandolabo_gpu::{
    AccessFlag, BufferBarrierBuilder, CommandBeginInfo, CommandDriver, Fence, GpuError,
    MemoryBarrierBuilder, PipelineStage, QueueFamilyType, SubmitSemaphoreGroup, TimelinePolicy,
    TimelineSemaphore, TimelineSemaphoreDriver, TimelineTracker, TransferOps, WaitedFences,
};
use pandolabo_highlevel::{ComputeRunner, ResourceTransfer, TransferPlan};
use pandolabo_test::{expect_u32s, gpu_tests_enabled, HeadlessHarness};

const WORDS: usize = 1024;

#[test]
fn headless_context_has_device_and_no_swapchain() {
    if !gpu_tests_enabled() {
        return;
    }
    let harness = HeadlessHarness::new().unwrap();
    let ctx = harness.ctx();

    assert!(ctx.is_initialized());
    assert!(!ctx.has_swapchain());
    assert!(matches!(
        ctx.swapchain(),
        Err(GpuError::SwapchainNotInitialized)
    ));
}

#[test]
fn upload_then_readback_round_trips() {
    if !gpu_tests_enabled() {
        return;
    }
    let harness = HeadlessHarness::new().unwrap();
    let ctx = harness.ctx();
    let buffer = harness.storage_buffer(4096).unwrap();

    let mut transfer = ResourceTransfer::new();
    transfer
        .upload_buffer(ctx, &buffer, &vec![5u32; WORDS])
        .unwrap();

    let mut out = vec![0u32; WORDS];
    transfer.readback_buffer(ctx, &buffer, &mut out).unwrap();
    expect_u32s(&out, std::iter::repeat(5)).unwrap();
}

#[test]
fn oversized_transfers_fail_validation_without_side_effects() {
    if !gpu_tests_enabled() {
        return;
    }
    let harness = HeadlessHarness::new().unwrap();
    let ctx = harness.ctx();
    let buffer = harness.storage_buffer(4096).unwrap();
    let mut transfer = ResourceTransfer::new();

    transfer
        .upload_buffer(ctx, &buffer, &vec![7u32; WORDS])
        .unwrap();

    let err = transfer
        .upload_buffer(ctx, &buffer, &vec![8u32; WORDS * 2])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.context(), "ResourceTransfer::uploadBuffer");

    let mut too_big = vec![9u32; WORDS * 2];
    let err = transfer
        .readback_buffer(ctx, &buffer, &mut too_big)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.context(), "ResourceTransfer::readbackBuffer");
    assert!(too_big.iter().all(|&v| v == 9));

    let mut out = vec![0u32; WORDS];
    transfer.readback_buffer(ctx, &buffer, &mut out).unwrap();
    expect_u32s(&out, std::iter::repeat(7)).unwrap();
}

#[test]
fn timeline_submissions_advance_by_one() {
    if !gpu_tests_enabled() {
        return;
    }
    let harness = HeadlessHarness::new().unwrap();
    let ctx = harness.ctx();
    let driver = CommandDriver::new(ctx, QueueFamilyType::Transfer).unwrap();
    let mut timeline = TimelineSemaphore::new(&ctx.device_arc()).unwrap();

    for i in 0..5u64 {
        assert_eq!(timeline.wait_value(), i);
        assert_eq!(timeline.signal_value(), i + 1);

        driver.reset_all_command_pools().unwrap();
        let cmd = driver.transfer(None);
        cmd.begin(&CommandBeginInfo::new()).unwrap();
        cmd.end().unwrap();
        driver
            .submit_timeline(PipelineStage::Transfer, &mut timeline)
            .unwrap();

        assert_eq!(timeline.signal_value(), i + 2);
        assert!(timeline.wait(WAIT_FOREVER).unwrap());
        assert!(timeline.counter_value().unwrap() >= i + 1);
    }

    assert!(!timeline.wait_for(100, 0).unwrap());
}

#[test]
fn reset_pool_rerecords_the_same_work() {
    if !gpu_tests_enabled() {
        return;
    }
    let harness = HeadlessHarness::new().unwrap();
    let ctx = harness.ctx();
    let expected: Vec<u32> = (0..WORDS as u32).collect();
    let src = harness.staging_with(&expected).unwrap();
    let dst = harness.storage_buffer(src.size()).unwrap();
    let mut transfer = ResourceTransfer::new();

    let driver = CommandDriver::new(ctx, QueueFamilyType::Transfer).unwrap();
    let fence = Fence::new(&ctx.device_arc(), false).unwrap();

    for _ in 0..2 {
        transfer
            .upload_buffer(ctx, &dst, &vec![0u32; WORDS])
            .unwrap();

        driver.reset_all_command_pools().unwrap();
        let cmd = driver.transfer(None);
        cmd.begin(&CommandBeginInfo::new()).unwrap();
        cmd.copy_buffer(&src, &dst);
        cmd.end().unwrap();

        fence.reset().unwrap();
        driver
            .submit(&SubmitSemaphoreGroup::new(), Some(&fence))
            .unwrap();
        assert!(fence.wait(WAIT_FOREVER).unwrap());

        let mut out = vec![0u32; WORDS];
        transfer.readback_buffer(ctx, &dst, &mut out).unwrap();
        expect_u32s(&out, expected.iter().copied()).unwrap();
    }
}

#[test]
fn secondaries_execute_in_allocation_order() {
    if !gpu_tests_enabled() {
        return;
    }
    let harness = HeadlessHarness::new().unwrap();
    let ctx = harness.ctx();
    let ones = harness.staging_with(&[1u32; WORDS]).unwrap();
    let twos = harness.staging_with(&[2u32; WORDS]).unwrap();
    let dst = harness.storage_buffer(ones.size()).unwrap();

    let mut driver = CommandDriver::new(ctx, QueueFamilyType::Transfer).unwrap();
    driver.construct_secondary(ctx, 2).unwrap();
    assert_eq!(driver.secondary_count(), 2);

    let first = driver.transfer(Some(0));
    let second = driver.transfer(Some(1));
    let write_after_write = MemoryBarrierBuilder::default()
        .src_access(&[AccessFlag::TransferWrite])
        .dst_access(&[AccessFlag::TransferWrite])
        .build();

    let (ones, twos, dst_ref) = (&ones, &twos, &dst);
    std::thread::scope(|scope| {
        scope.spawn(move || {
            // Finish after the second thread.
            std::thread::sleep(Duration::from_millis(50));
            first.begin(&CommandBeginInfo::new()).unwrap();
            first.copy_buffer(ones, dst_ref);
            first.end().unwrap();
        });
        scope.spawn(move || {
            second.begin(&CommandBeginInfo::new()).unwrap();
            second.set_memory_barrier(
                &write_after_write,
                PipelineStage::Transfer,
                PipelineStage::Transfer,
            );
            second.copy_buffer(twos, dst_ref);
            second.end().unwrap();
        });
    });

    let primary = driver.transfer(None);
    primary.begin(&CommandBeginInfo::new()).unwrap();
    driver.merge_secondary_commands();
    primary.end().unwrap();
    driver.submit(&SubmitSemaphoreGroup::new(), None).unwrap();
    driver.queue_wait_idle().unwrap();

    let mut out = vec![0u32; WORDS];
    ResourceTransfer::new()
        .readback_buffer(ctx, &dst, &mut out)
        .unwrap();
    expect_u32s(&out, std::iter::repeat(2)).unwrap();

    driver.destroy_secondary();
    assert_eq!(driver.secondary_count(), 0);
}

#[test]
fn compute_runner_chains_on_a_timeline() {
    if !gpu_tests_enabled() {
        return;
    }
    let harness = HeadlessHarness::new().unwrap();
    let ctx = harness.ctx();
    let expected: Vec<u32> = (0..WORDS as u32).map(|v| v * 3).collect();
    let src = harness.staging_with(&expected).unwrap();
    let dst = harness.storage_buffer(src.size()).unwrap();
    let mut tracker = TimelineTracker::new(&ctx.device_arc(), TimelinePolicy::default()).unwrap();

    let mut runner = ComputeRunner::new();
    let cmd = runner.begin(ctx).unwrap();
    runner
        .record(&cmd, |cmd| {
            cmd.copy_buffer(&src, &dst);
            Ok(())
        })
        .unwrap();
    let signal = tracker.next_signal().unwrap();
    runner
        .submit(&SubmitSemaphoreGroup::new().signal_token(signal))
        .unwrap();
    assert!(tracker.wait(WAIT_FOREVER).unwrap());

    let mut out = vec![0u32; WORDS];
    ResourceTransfer::with_role(QueueFamilyType::Compute)
        .readback_buffer(ctx, &dst, &mut out)
        .unwrap();
    expect_u32s(&out, expected.iter().copied()).unwrap();

    let cmd = runner.begin(ctx).unwrap();
    let err = runner
        .record(&cmd, |_| Err(Error::validation("bad dispatch size")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.context(), "ComputeRunner::record");
    cmd.end().unwrap();
}

#[test]
fn transfer_plan_round_trip() {
    if !gpu_tests_enabled() {
        return;
    }
    let harness = HeadlessHarness::new().unwrap();
    let ctx = harness.ctx();
    let expected: Vec<u32> = (0..WORDS as u32).rev().collect();
    let src = harness.staging_with(&expected).unwrap();
    let middle = harness.storage_buffer(src.size()).unwrap();
    let readback = pandolabo_gpu::Buffer::staging_from_gpu(ctx, src.size()).unwrap();

    let mut plan = TransferPlan::new(QueueFamilyType::Transfer);
    assert!(plan.submit(ctx, &SubmitSemaphoreGroup::new()).is_ok());

    plan.add_buffer_barrier(
        BufferBarrierBuilder::new()
            .buffer(&src)
            .src_access(&[AccessFlag::HostWrite])
            .dst_access(&[AccessFlag::TransferRead])
            .build()
            .unwrap(),
        &[PipelineStage::Host],
        &[PipelineStage::Transfer],
    );
    plan.copy_buffer(&src, &middle);
    plan.add_buffer_barrier(
        BufferBarrierBuilder::new()
            .buffer(&middle)
            .src_access(&[AccessFlag::TransferWrite])
            .dst_access(&[AccessFlag::TransferRead])
            .build()
            .unwrap(),
        &[PipelineStage::Transfer],
        &[PipelineStage::Transfer],
    );
    plan.copy_buffer(&middle, &readback);
    plan.add_buffer_barrier(
        BufferBarrierBuilder::new()
            .buffer(&readback)
            .src_access(&[AccessFlag::TransferWrite])
            .dst_access(&[AccessFlag::HostRead])
            .build()
            .unwrap(),
        &[PipelineStage::Transfer],
        &[PipelineStage::Host],
    );

    // barrier, copy, barrier, copy; the trailing barrier is still pending
    assert_eq!(plan.len(), 4);
    assert_eq!(plan.pending_barrier_count(), 1);

    plan.submit(ctx, &SubmitSemaphoreGroup::new()).unwrap();
    assert_eq!(plan.len(), 5);

    let mut out = vec![0u32; WORDS];
    readback.read(&mut out).unwrap();
    expect_u32s(&out, expected.iter().copied()).unwrap();
}

#[test]
fn tracker_recreates_past_threshold() {
    if !gpu_tests_enabled() {
        return;
    }
    let harness = HeadlessHarness::new().unwrap();
    let ctx = harness.ctx();
    let mut tracker =
        TimelineTracker::new(&ctx.device_arc(), TimelinePolicy::with_threshold(3)).unwrap();

    let first_handle = tracker.semaphore().handle();
    let mut values = Vec::new();
    for _ in 0..6 {
        let token = tracker.next_signal().unwrap();
        values.push(token.value());
        tracker.semaphore().signal(token.value()).unwrap();
    }

    assert_eq!(values, vec![1, 2, 3, 4, 1, 2]);
    assert_eq!(tracker.generation(), 1);
    assert!(tracker.wait(WAIT_FOREVER).unwrap());

    assert_ne!(tracker.semaphore().handle(), first_handle);
    assert_eq!(tracker.semaphore().retired_count(), 1);
    ctx.wait_idle().unwrap();
    unsafe { tracker.destroy_retired() };
    assert_eq!(tracker.semaphore().retired_count(), 0);
}

#[test]
fn explicit_tokens_leave_bookkeeping_alone() {
    if !gpu_tests_enabled() {
        return;
    }
    let harness = HeadlessHarness::new().unwrap();
    let ctx = harness.ctx();
    let timeline = TimelineSemaphore::new(&ctx.device_arc()).unwrap();

    let wait = timeline.for_wait(5);
    let signal = timeline.for_signal(7);

    assert_eq!(wait.value(), 5);
    assert_eq!(signal.value(), 7);
    assert_eq!(wait.semaphore(), timeline.handle());
    assert_eq!(signal.semaphore(), timeline.handle());
    assert_eq!(timeline.wait_value(), 0);
    assert_eq!(timeline.signal_value(), 1);
    assert_eq!(timeline.counter_value().unwrap(), 0);
}

#[test]
fn host_waits_on_fences_and_timelines() {
    if !gpu_tests_enabled() {
        return;
    }
    let harness = HeadlessHarness::new().unwrap();
    let ctx = harness.ctx();
    let device = ctx.device_arc();

    let a = Fence::new(&device, true).unwrap();
    let b = Fence::new(&device, true).unwrap();
    let fences = WaitedFences::new([&a, &b]);
    assert_eq!(fences.len(), 2);
    assert!(fences.wait(ctx.device(), WAIT_FOREVER, true).unwrap());
    assert!(!a.is_signaled().unwrap());
    assert!(!fences.wait(ctx.device(), 0, false).unwrap());

    let first = TimelineSemaphore::new(&device).unwrap();
    let second = TimelineSemaphore::new(&device).unwrap();
    let driver = TimelineSemaphoreDriver::new()
        .set_semaphores([&first, &second])
        .set_values(&[3, 4]);
    driver.signal(ctx.device()).unwrap();
    assert!(driver.wait(ctx.device(), WAIT_FOREVER).unwrap());
    assert_eq!(second.counter_value().unwrap(), 4);

    let ahead = TimelineSemaphoreDriver::new()
        .set_semaphores([&first])
        .set_values(&[10]);
    assert!(!ahead.wait(ctx.device(), 0).unwrap());
}
