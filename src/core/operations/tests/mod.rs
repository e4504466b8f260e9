mod intent_tests;
