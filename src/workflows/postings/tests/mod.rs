mod common;
mod sweeper;
mod targeting;
