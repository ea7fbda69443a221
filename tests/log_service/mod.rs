mod push_pull_test;
