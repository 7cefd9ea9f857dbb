//! Confinement applied by the worker before it reads any input.
//!
//! The worker gives up core dumps, sets `no_new_privs` and installs a
//! seccomp-BPF allow-list. What the transform needs after that is reading
//! stdin, writing stdout/stderr, managing heap memory and exiting.
//! `mmap`/`mremap` fail with `ENOMEM` so the allocator falls back to `brk`;
//! any other syscall kills the process.

use crate::error::{Result, SandboxError};

/// Disable core dumps, then install the syscall filter.
pub fn confine() -> Result<()> {
    disable_core_dumps()?;
    imp::install()
}

#[cfg(unix)]
fn disable_core_dumps() -> Result<()> {
    let limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: setrlimit only reads the struct we pass.
    if unsafe { libc::setrlimit(libc::RLIMIT_CORE, &limit) } != 0 {
        return Err(SandboxError::Policy(std::io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(not(unix))]
fn disable_core_dumps() -> Result<()> {
    Err(SandboxError::Unsupported("resource limits"))
}

#[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]
mod imp {
    use std::io;

    use crate::error::{Result, SandboxError};

    // linux/filter.h
    const BPF_LD: u16 = 0x00;
    const BPF_W: u16 = 0x00;
    const BPF_ABS: u16 = 0x20;
    const BPF_JMP: u16 = 0x05;
    const BPF_JEQ: u16 = 0x10;
    const BPF_K: u16 = 0x00;
    const BPF_RET: u16 = 0x06;

    // linux/seccomp.h
    const SECCOMP_MODE_FILTER: libc::c_ulong = 2;
    const SECCOMP_RET_KILL_PROCESS: u32 = 0x8000_0000;
    const SECCOMP_RET_ERRNO: u32 = 0x0005_0000;
    const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;

    // offsetof(struct seccomp_data, nr / arch)
    const NR_OFFSET: u32 = 0;
    const ARCH_OFFSET: u32 = 4;

    #[cfg(target_arch = "x86_64")]
    const AUDIT_ARCH: u32 = 0xC000_003E;
    #[cfg(target_arch = "aarch64")]
    const AUDIT_ARCH: u32 = 0xC000_00B7;

    const ALLOWED: &[libc::c_long] = &[
        libc::SYS_read,
        libc::SYS_write,
        libc::SYS_brk,
        libc::SYS_munmap,
        libc::SYS_madvise,
        libc::SYS_clock_gettime,
        libc::SYS_times,
        libc::SYS_futex,
        libc::SYS_getrandom,
        libc::SYS_sched_yield,
        libc::SYS_rt_sigreturn,
        libc::SYS_rt_sigprocmask,
        libc::SYS_sigaltstack,
        libc::SYS_exit,
        libc::SYS_exit_group,
    ];

    const OUT_OF_MEMORY: &[libc::c_long] = &[libc::SYS_mmap, libc::SYS_mremap];

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct SockFilter {
        code: u16,
        jt: u8,
        jf: u8,
        k: u32,
    }

    #[repr(C)]
    struct SockFprog {
        len: libc::c_ushort,
        filter: *const SockFilter,
    }

    fn stmt(code: u16, k: u32) -> SockFilter {
        SockFilter { code, jt: 0, jf: 0, k }
    }

    fn jeq(k: u32, jt: u8, jf: u8) -> SockFilter {
        SockFilter {
            code: BPF_JMP | BPF_JEQ | BPF_K,
            jt,
            jf,
            k,
        }
    }

    fn program() -> Vec<SockFilter> {
        let mut prog = vec![
            stmt(BPF_LD | BPF_W | BPF_ABS, ARCH_OFFSET),
            jeq(AUDIT_ARCH, 1, 0),
            stmt(BPF_RET | BPF_K, SECCOMP_RET_KILL_PROCESS),
            stmt(BPF_LD | BPF_W | BPF_ABS, NR_OFFSET),
        ];
        for nr in ALLOWED {
            prog.push(jeq(*nr as u32, 0, 1));
            prog.push(stmt(BPF_RET | BPF_K, SECCOMP_RET_ALLOW));
        }
        for nr in OUT_OF_MEMORY {
            prog.push(jeq(*nr as u32, 0, 1));
            prog.push(stmt(
                BPF_RET | BPF_K,
                SECCOMP_RET_ERRNO | libc::ENOMEM as u32,
            ));
        }
        prog.push(stmt(BPF_RET | BPF_K, SECCOMP_RET_KILL_PROCESS));
        prog
    }

    pub(super) fn install() -> Result<()> {
        let prog = program();
        let fprog = SockFprog {
            len: prog.len() as libc::c_ushort,
            filter: prog.as_ptr(),
        };

        // SAFETY: prctl with integer arguments only.
        let rc = unsafe {
            libc::prctl(
                libc::PR_SET_NO_NEW_PRIVS,
                1 as libc::c_ulong,
                0 as libc::c_ulong,
                0 as libc::c_ulong,
                0 as libc::c_ulong,
            )
        };
        if rc != 0 {
            return Err(SandboxError::Policy(io::Error::last_os_error()));
        }

        // SAFETY: `fprog` and the instructions it points to outlive the call;
        // the kernel copies the program.
        let rc = unsafe {
            libc::prctl(
                libc::PR_SET_SECCOMP,
                SECCOMP_MODE_FILTER,
                &fprog as *const SockFprog,
            )
        };
        if rc != 0 {
            return Err(SandboxError::Policy(io::Error::last_os_error()));
        }
        Ok(())
    }

}

#[cfg(not(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64"))))]
mod imp {
    use crate::error::{Result, SandboxError};

    pub(super) fn install() -> Result<()> {
        Err(SandboxError::Unsupported(
            "seccomp filters need linux on x86_64 or aarch64",
        ))
    }
}
