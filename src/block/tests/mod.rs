mod tests_coords;
