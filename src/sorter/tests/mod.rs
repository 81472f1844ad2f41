mod tests_basic;
mod tests_misuse;
mod tests_stability;
