mod common;
mod lifecycle;
mod retransmit;
