pub mod deepseek_web;
