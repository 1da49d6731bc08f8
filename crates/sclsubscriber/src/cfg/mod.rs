pub mod startupcfg;
