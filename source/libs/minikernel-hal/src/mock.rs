// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Deterministic host HAL for kernel unit and integration tests
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: tests/mock_hal.rs
//! PUBLIC API: MockHal (programs, user memory, scripted interrupts, inspection helpers)
//! INVARIANTS: Never re-enters the kernel; `halt` only returns scripted interrupts
//!
//! The mock models one CPU register file plus a table of saved contexts.
//! `switch_context` stores the CPU registers into the outgoing snapshot and
//! loads the incoming one, so a test can play "user mode" by writing the CPU
//! registers and then dispatching a syscall event into the kernel.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::String;
use alloc::vec::Vec;

use crate::{
    ContextHandle, Hal, HalError, HardwareIrq, ImageHandle, IrqLevel, LoadedImage, StackHandle,
    Vector, Vectors, NUM_REGS,
};

/// Base of the simulated user address range handed out by `place_*`.
const USER_BASE: usize = 0x1000;
/// Gap left between placed user buffers so overruns hit unmapped memory.
const USER_GUARD: usize = 0x100;

#[derive(Clone, Debug)]
struct MockContext {
    regs: [usize; NUM_REGS],
    image: ImageHandle,
    stack: StackHandle,
    entry: usize,
}

/// Record of a single `switch_context` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwitchRecord {
    pub from: Option<ContextHandle>,
    pub to: ContextHandle,
}

/// Mock HAL for host testing.
pub struct MockHal {
    installed: Vectors,
    controller_ready: bool,
    keyboard_ready: bool,
    clock_hz: Option<u32>,
    cpu: [usize; NUM_REGS],
    live: Option<ContextHandle>,
    contexts: BTreeMap<usize, MockContext>,
    next_context: usize,
    programs: BTreeMap<String, usize>,
    images: BTreeMap<usize, String>,
    next_image: usize,
    stacks: BTreeMap<usize, usize>,
    next_stack: usize,
    fail_stack_alloc: bool,
    user_memory: BTreeMap<usize, Vec<u8>>,
    next_user_addr: usize,
    user_mode: bool,
    level: IrqLevel,
    halt_levels: Vec<IrqLevel>,
    scripted_irqs: VecDeque<HardwareIrq>,
    software_pending: bool,
    port_input: VecDeque<u8>,
    console: Vec<u8>,
    switches: Vec<SwitchRecord>,
}

impl MockHal {
    /// Creates a mock with no known programs.
    pub fn new() -> Self {
        Self {
            installed: Vectors::empty(),
            controller_ready: false,
            keyboard_ready: false,
            clock_hz: None,
            cpu: [0; NUM_REGS],
            live: None,
            contexts: BTreeMap::new(),
            next_context: 1,
            programs: BTreeMap::new(),
            images: BTreeMap::new(),
            next_image: 1,
            stacks: BTreeMap::new(),
            next_stack: 1,
            fail_stack_alloc: false,
            user_memory: BTreeMap::new(),
            next_user_addr: USER_BASE,
            user_mode: true,
            level: IrqLevel::L3,
            halt_levels: Vec::new(),
            scripted_irqs: VecDeque::new(),
            software_pending: false,
            port_input: VecDeque::new(),
            console: Vec::new(),
            switches: Vec::new(),
        }
    }

    /// Creates a mock that can load every program in `names`.
    pub fn with_programs(names: &[&str]) -> Self {
        let mut hal = Self::new();
        for name in names {
            hal.register_program(name);
        }
        hal
    }

    /// Makes `name` loadable. Entry points are derived from registration order.
    pub fn register_program(&mut self, name: &str) {
        let entry = 0x40_0000 + self.programs.len() * 0x1000;
        self.programs.insert(String::from(name), entry);
    }

    /// Copies `bytes` into simulated user memory and returns its address.
    pub fn place_bytes(&mut self, bytes: &[u8]) -> usize {
        let addr = self.next_user_addr;
        self.next_user_addr += bytes.len() + USER_GUARD;
        self.user_memory.insert(addr, bytes.to_vec());
        addr
    }

    /// Copies `s` plus a NUL terminator into user memory and returns its address.
    pub fn place_str(&mut self, s: &str) -> usize {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.place_bytes(&bytes)
    }

    /// Loads the CPU registers as user code would before trapping.
    pub fn set_registers(&mut self, regs: &[usize]) {
        for (slot, value) in self.cpu.iter_mut().zip(regs.iter()) {
            *slot = *value;
        }
    }

    /// Returns a CPU register.
    pub fn cpu_register(&self, index: usize) -> usize {
        self.cpu[index]
    }

    /// Returns register `index` of `ctx`, reading the CPU if `ctx` is live.
    pub fn context_register(&self, ctx: ContextHandle, index: usize) -> Option<usize> {
        if self.live == Some(ctx) {
            return Some(self.cpu[index]);
        }
        self.contexts.get(&ctx.as_raw()).map(|c| c.regs[index])
    }

    /// Returns the context restored on trap exit.
    pub fn live_context(&self) -> Option<ContextHandle> {
        self.live
    }

    /// Returns the entry point a context was built with.
    pub fn context_entry(&self, ctx: ContextHandle) -> Option<usize> {
        self.contexts.get(&ctx.as_raw()).map(|c| c.entry)
    }

    /// Returns the image and stack a context was built with.
    pub fn context_resources(&self, ctx: ContextHandle) -> Option<(ImageHandle, StackHandle)> {
        self.contexts.get(&ctx.as_raw()).map(|c| (c.image, c.stack))
    }

    /// Queues a hardware interrupt to be reported by the next `halt`.
    pub fn script_irq(&mut self, irq: HardwareIrq) {
        self.scripted_irqs.push_back(irq);
    }

    /// Queues a byte for the terminal port.
    pub fn push_terminal_byte(&mut self, byte: u8) {
        self.port_input.push_back(byte);
    }

    /// Marks the next traps as raised from kernel (`false`) or user (`true`) mode.
    pub fn set_user_mode(&mut self, user: bool) {
        self.user_mode = user;
    }

    /// Makes subsequent stack allocations fail.
    pub fn set_stack_alloc_failure(&mut self, fail: bool) {
        self.fail_stack_alloc = fail;
    }

    /// Returns and clears the pending software interrupt request.
    pub fn take_software_interrupt(&mut self) -> bool {
        core::mem::take(&mut self.software_pending)
    }

    /// Returns whether a software interrupt is pending.
    pub fn software_interrupt_pending(&self) -> bool {
        self.software_pending
    }

    pub fn installed_vectors(&self) -> Vectors {
        self.installed
    }

    pub fn clock_hz(&self) -> Option<u32> {
        self.clock_hz
    }

    pub fn controllers_ready(&self) -> bool {
        self.controller_ready && self.keyboard_ready
    }

    pub fn irq_level(&self) -> IrqLevel {
        self.level
    }

    /// Levels observed at each `halt` call.
    pub fn halt_levels(&self) -> &[IrqLevel] {
        &self.halt_levels
    }

    pub fn switches(&self) -> &[SwitchRecord] {
        &self.switches
    }

    pub fn console_output(&self) -> &[u8] {
        &self.console
    }

    pub fn live_stacks(&self) -> usize {
        self.stacks.len()
    }

    pub fn live_images(&self) -> usize {
        self.images.len()
    }

    pub fn live_contexts(&self) -> usize {
        self.contexts.len()
    }

    fn region_for(&self, addr: usize) -> Option<(&[u8], usize)> {
        let (base, bytes) = self.user_memory.range(..=addr).next_back()?;
        let offset = addr - base;
        if offset >= bytes.len() {
            return None;
        }
        Some((bytes.as_slice(), offset))
    }
}

impl Default for MockHal {
    fn default() -> Self {
        Self::new()
    }
}

impl Hal for MockHal {
    fn install_handler(&mut self, vector: Vector) {
        self.installed |= vector.bit();
    }

    fn init_interrupt_controller(&mut self) {
        self.controller_ready = true;
    }

    fn init_clock(&mut self, hz: u32) {
        self.clock_hz = Some(hz);
    }

    fn init_keyboard(&mut self) {
        self.keyboard_ready = true;
    }

    fn build_context(
        &mut self,
        image: ImageHandle,
        stack: StackHandle,
        _stack_size: usize,
        entry: usize,
    ) -> ContextHandle {
        let raw = self.next_context;
        self.next_context += 1;
        self.contexts.insert(raw, MockContext { regs: [0; NUM_REGS], image, stack, entry });
        ContextHandle::from_raw(raw)
    }

    fn switch_context(&mut self, from: Option<ContextHandle>, to: ContextHandle) {
        if let Some(from) = from {
            if let Some(saved) = self.contexts.get_mut(&from.as_raw()) {
                saved.regs = self.cpu;
            }
        }
        self.cpu = self.contexts.get(&to.as_raw()).map(|c| c.regs).unwrap_or([0; NUM_REGS]);
        self.live = Some(to);
        self.switches.push(SwitchRecord { from, to });
    }

    fn discard_context(&mut self, ctx: ContextHandle) {
        self.contexts.remove(&ctx.as_raw());
    }

    fn load_image(&mut self, program: &str) -> Result<LoadedImage, HalError> {
        let entry = *self.programs.get(program).ok_or(HalError::ImageNotFound)?;
        let raw = self.next_image;
        self.next_image += 1;
        self.images.insert(raw, String::from(program));
        Ok(LoadedImage { image: ImageHandle::from_raw(raw), entry })
    }

    fn release_image(&mut self, image: ImageHandle) {
        self.images.remove(&image.as_raw());
    }

    fn alloc_stack(&mut self, size: usize) -> Result<StackHandle, HalError> {
        if self.fail_stack_alloc {
            return Err(HalError::OutOfMemory);
        }
        let raw = self.next_stack;
        self.next_stack += 1;
        self.stacks.insert(raw, size);
        Ok(StackHandle::from_raw(raw))
    }

    fn free_stack(&mut self, stack: StackHandle) {
        self.stacks.remove(&stack.as_raw());
    }

    fn read_register(&self, index: usize) -> usize {
        self.cpu.get(index).copied().unwrap_or(0)
    }

    fn write_register(&mut self, index: usize, value: usize) {
        if let Some(slot) = self.cpu.get_mut(index) {
            *slot = value;
        }
    }

    fn copy_from_user(&self, addr: usize, buf: &mut [u8]) -> Result<(), HalError> {
        if buf.is_empty() {
            return Ok(());
        }
        let (bytes, offset) = self.region_for(addr).ok_or(HalError::BadAddress)?;
        let src = bytes.get(offset..offset + buf.len()).ok_or(HalError::BadAddress)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn copy_cstr_from_user(&self, addr: usize, buf: &mut [u8]) -> Result<usize, HalError> {
        let (bytes, offset) = self.region_for(addr).ok_or(HalError::BadAddress)?;
        for (i, slot) in buf.iter_mut().enumerate() {
            let byte = *bytes.get(offset + i).ok_or(HalError::BadAddress)?;
            if byte == 0 {
                return Ok(i);
            }
            *slot = byte;
        }
        Ok(buf.len())
    }

    fn from_user_mode(&self) -> bool {
        self.user_mode
    }

    fn set_irq_level(&mut self, level: IrqLevel) -> IrqLevel {
        core::mem::replace(&mut self.level, level)
    }

    fn halt(&mut self) -> HardwareIrq {
        self.halt_levels.push(self.level);
        match self.scripted_irqs.pop_front() {
            Some(irq) => irq,
            None => panic!("MockHal: halt with no scripted interrupt"),
        }
    }

    fn raise_software_interrupt(&mut self) {
        self.software_pending = true;
    }

    fn read_port(&mut self, _port: u16) -> u8 {
        self.port_input.pop_front().unwrap_or(0)
    }

    fn console_write(&mut self, bytes: &[u8]) {
        self.console.extend_from_slice(bytes);
    }
}
