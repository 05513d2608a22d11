/// Annotated configuration file written by `generate-config`.
pub const CONFIG_TEMPLATE: &str = r#"# Failsafe snapshot replication configuration
#
# Every key can be overridden from the environment, e.g.
#   FAILSAFE_PRODUCER__SHARE_WITH=210987654321
#   FAILSAFE_PRODUCER__INSTANCES=orders-db,billing-db

region = "eu-west-1"

[naming]
automated_prefix = "rds:"
managed_prefix = "failsafe-"

[waiter]
poll_interval_secs = 10
timeout_secs = 3600

# Live account
[producer]
instances = ["orders-db"]
share_with = "210987654321"
# topic_arn = "arn:aws:sns:eu-west-1:012345678901:failsafe-replication"
retention_days = 1
renotify_on_replay = true

# Failsafe account
[consumer]
retention_days = 31

[logging]
level = "info"    # trace, debug, info, warn, error
format = "pretty" # pretty or json
"#;
