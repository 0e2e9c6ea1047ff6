pub mod kumex;
