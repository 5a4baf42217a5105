// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Syscall handlers and the per-trap kernel context they run in
//! OWNERS: @kernel-team
//! PUBLIC API: Context, install_handlers
//! DEPENDS_ON: task (lifecycle), sync (mutex ops), sched (sleep), minikernel-hal user copies
//! INVARIANTS: Handlers decode and validate registers, then call one core operation;
//!             handlers never switch context

use minikernel_hal::Hal;

use super::{
    Args, Error, SyscallTable, SysResult, SYSCALL_CLOSE_MUTEX, SYSCALL_CREATE_MUTEX,
    SYSCALL_CREATE_PROCESS, SYSCALL_GET_ID, SYSCALL_LOCK, SYSCALL_OPEN_MUTEX, SYSCALL_SLEEP,
    SYSCALL_TERMINATE_PROCESS, SYSCALL_UNLOCK, SYSCALL_WRITE,
};
use crate::config::{KernelConfig, MAX_NOM_MUT, MAX_PROGRAM_NAME, MAX_WRITE_LEN};
use crate::state::{fatal, KernelState};
use crate::sync::mutex::{MutexKind, MutexName};
use crate::task::Pce;
use crate::types::{Descriptor, Pid};

/// Everything a handler may touch while servicing one trap.
pub struct Context<'a, H> {
    pub hal: &'a mut H,
    pub state: &'a mut KernelState,
    pub config: &'a KernelConfig,
}

impl<'a, H: Hal> Context<'a, H> {
    pub fn new(hal: &'a mut H, state: &'a mut KernelState, config: &'a KernelConfig) -> Self {
        Self { hal, state, config }
    }

    /// Process that raised the trap.
    pub fn caller(&self) -> SysResult<Pid> {
        self.state.sched.current().ok_or(Error::InvalidSyscall)
    }

    pub(crate) fn pce(&self, pid: Pid) -> &Pce {
        match self.state.procs.get(pid) {
            Some(pce) => pce,
            None => fatal(format_args!("pid {} outside the process table", pid)),
        }
    }

    pub(crate) fn pce_mut(&mut self, pid: Pid) -> &mut Pce {
        match self.state.procs.get_mut(pid) {
            Some(pce) => pce,
            None => fatal(format_args!("pid {} outside the process table", pid)),
        }
    }

    fn read_mutex_name(&self, addr: usize) -> SysResult<MutexName> {
        let mut buf = [0u8; MAX_NOM_MUT + 1];
        let len = self.hal.copy_cstr_from_user(addr, &mut buf)?;
        Ok(MutexName::new(&buf[..len])?)
    }
}

/// Installs the default handler set.
pub fn install_handlers<H: Hal>(table: &mut SyscallTable<H>) {
    table.register(SYSCALL_CREATE_PROCESS, sys_create_process);
    table.register(SYSCALL_TERMINATE_PROCESS, sys_terminate_process);
    table.register(SYSCALL_WRITE, sys_write);
    table.register(SYSCALL_GET_ID, sys_get_id);
    table.register(SYSCALL_SLEEP, sys_sleep);
    table.register(SYSCALL_CREATE_MUTEX, sys_create_mutex);
    table.register(SYSCALL_OPEN_MUTEX, sys_open_mutex);
    table.register(SYSCALL_LOCK, sys_lock);
    table.register(SYSCALL_UNLOCK, sys_unlock);
    table.register(SYSCALL_CLOSE_MUTEX, sys_close_mutex);
}

fn sys_create_process<H: Hal>(ctx: &mut Context<'_, H>, args: &Args) -> SysResult<usize> {
    let mut buf = [0u8; MAX_PROGRAM_NAME + 1];
    let len = ctx.hal.copy_cstr_from_user(args.get(0), &mut buf)?;
    if len > MAX_PROGRAM_NAME {
        return Err(Error::NameTooLong);
    }
    if len == 0 {
        return Err(Error::InvalidName);
    }
    let program = core::str::from_utf8(&buf[..len]).map_err(|_| Error::InvalidName)?;
    ctx.create_process(program).map(|pid| pid.as_index())
}

fn sys_terminate_process<H: Hal>(ctx: &mut Context<'_, H>, _args: &Args) -> SysResult<usize> {
    let pid = ctx.caller()?;
    ctx.terminate(pid);
    Err(Error::TaskExit)
}

fn sys_write<H: Hal>(ctx: &mut Context<'_, H>, args: &Args) -> SysResult<usize> {
    let len = args.get(1).min(MAX_WRITE_LEN);
    let mut buf = [0u8; MAX_WRITE_LEN];
    ctx.hal.copy_from_user(args.get(0), &mut buf[..len])?;
    ctx.hal.console_write(&buf[..len]);
    Ok(0)
}

fn sys_get_id<H: Hal>(ctx: &mut Context<'_, H>, _args: &Args) -> SysResult<usize> {
    ctx.caller().map(|pid| pid.as_index())
}

fn sys_sleep<H: Hal>(ctx: &mut Context<'_, H>, args: &Args) -> SysResult<usize> {
    let pid = ctx.caller()?;
    let ticks = ctx.config.seconds_to_ticks(args.get(0));
    ctx.sleep(pid, ticks)
}

fn sys_create_mutex<H: Hal>(ctx: &mut Context<'_, H>, args: &Args) -> SysResult<usize> {
    let pid = ctx.caller()?;
    let kind = MutexKind::from_raw(args.get(1)).ok_or(Error::InvalidMutexKind)?;
    let name = ctx.read_mutex_name(args.get(0))?;
    ctx.create_mutex(pid, name, kind)
}

fn sys_open_mutex<H: Hal>(ctx: &mut Context<'_, H>, args: &Args) -> SysResult<usize> {
    let pid = ctx.caller()?;
    let name = ctx.read_mutex_name(args.get(0))?;
    ctx.open_mutex(pid, &name)
}

fn sys_lock<H: Hal>(ctx: &mut Context<'_, H>, args: &Args) -> SysResult<usize> {
    let pid = ctx.caller()?;
    let mutex = ctx.resolve_descriptor(pid, args.get(0))?;
    ctx.lock_mutex(pid, mutex)
}

fn sys_unlock<H: Hal>(ctx: &mut Context<'_, H>, args: &Args) -> SysResult<usize> {
    let pid = ctx.caller()?;
    let mutex = ctx.resolve_descriptor(pid, args.get(0))?;
    ctx.unlock_mutex(pid, mutex)
}

fn sys_close_mutex<H: Hal>(ctx: &mut Context<'_, H>, args: &Args) -> SysResult<usize> {
    let pid = ctx.caller()?;
    let descriptor = Descriptor::decode(args.get(0)).ok_or(Error::InvalidDescriptor)?;
    ctx.close_mutex(pid, descriptor)
}
