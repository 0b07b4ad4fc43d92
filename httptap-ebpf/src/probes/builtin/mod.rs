pub mod http_traffic;
pub mod syscall_types;
