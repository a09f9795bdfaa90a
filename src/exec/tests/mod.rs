mod tests_joins;
