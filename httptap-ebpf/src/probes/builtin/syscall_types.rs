/// Common tracepoint header for syscall events (sys_enter_*, sys_exit_*)
#[repr(C)]
#[allow(dead_code)]
pub struct SyscallTraceHeader {
    pub common_type: u16,
    pub common_flags: u8,
    pub common_preempt_count: u8,
    pub common_pid: i32,
    pub __syscall_nr: i32,
    pub _pad: i32,
}

// ============================================================
// sys_enter_write
// ============================================================

/// Every syscall argument occupies 8 bytes in the tracepoint record,
/// whatever its C type (`unsigned int fd`, `const char *buf`, `size_t count`).
#[repr(C)]
#[allow(dead_code)]
pub struct SysEnterWrite {
    pub header: SyscallTraceHeader,
    pub fd: u64,
    pub buf: u64,
    pub count: u64,
}

// ============================================================
// sys_exit_read
// ============================================================

#[repr(C)]
#[allow(dead_code)]
pub struct SysExitRead {
    pub header: SyscallTraceHeader,
    pub ret: i64,
}
