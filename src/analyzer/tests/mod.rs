mod tests_stat1;
