
mod channel_test;
