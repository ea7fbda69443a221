mod failover_test;
mod purge_test;
