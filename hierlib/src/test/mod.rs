mod tests;
mod trace_tests;
