mod submission_rules_unit;
