mod adapter_test;
