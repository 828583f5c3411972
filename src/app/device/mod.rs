pub mod cpuinfo;
pub mod getprop;
pub mod info;
