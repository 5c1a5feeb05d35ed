#[cfg(test)]
mod tests {
    use ahash::AHashSet;
    use hark::{
        Config, ExpansionError, Grammar, IntentGraph, ParseError, RecognitionError,
        RecognizeOptions, SlotValues, Value,
    };

    fn graph_for(template: &str) -> IntentGraph {
        let grammar = Grammar::parse(template).expect("template parses");
        let grammar = hark::expand(&grammar, &Default::default(), &Default::default())
            .expect("template expands");
        hark::compile(&grammar).expect("grammar compiles")
    }

    fn strict() -> RecognizeOptions {
        RecognizeOptions {
            config: Config {
                fuzzy: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn fuzzy_exact_match_with_entity() {
        let graph = graph_for("[LightOn]\nturn on [the] (living room lamp | kitchen light){name}");
        let recognitions = hark::recognize(&graph, "turn on living room lamp").unwrap();
        assert_eq!(recognitions.len(), 1, "expected exactly one recognition");
        let best = &recognitions[0];
        assert_eq!(best.intent.name, "LightOn");
        assert_eq!(best.intent.confidence, 1.0);
        assert_eq!(best.text, "turn on living room lamp");
        assert_eq!(best.raw_text, "turn on living room lamp");
        assert!(best.recognize_seconds >= 0.0);

        assert_eq!(best.entities.len(), 1);
        let entity = &best.entities[0];
        assert_eq!(entity.name, "name");
        assert_eq!(entity.value, Value::Str("living room lamp".to_string()));
        assert_eq!(entity.start, 8);
        assert_eq!(entity.end, 24);
        assert_eq!(&best.text[entity.start..entity.end], "living room lamp");
    }

    #[test]
    fn optional_words_stay_out_of_entities() {
        let graph = graph_for("[LightOn]\nturn on [the] (living room lamp | kitchen light){name}");
        let recognitions = hark::recognize(&graph, "turn on the kitchen light").unwrap();
        let best = &recognitions[0];
        assert_eq!(best.intent.name, "LightOn");
        assert!(best.tokens.contains(&"the".to_string()));
        let entity = &best.entities[0];
        assert_eq!(entity.value, Value::Str("kitchen light".to_string()));
        assert_eq!(entity.raw_tokens, vec!["kitchen", "light"]);
        assert!(!entity.raw_tokens.contains(&"the".to_string()));
    }

    #[test]
    fn converter_produces_typed_entity_tokens() {
        let graph = graph_for("[SetBrightness]\nset brightness to (one:1 | two:2){value!int}");
        let recognitions = hark::recognize(&graph, "set brightness to two").unwrap();
        let best = &recognitions[0];
        assert_eq!(best.intent.name, "SetBrightness");
        let entity = &best.entities[0];
        assert_eq!(entity.tokens, vec![Value::Int(2)]);
        assert_eq!(entity.raw_tokens, vec!["two"]);
        assert_eq!(entity.value, Value::Int(2));
        assert_eq!(best.text, "set brightness to 2");
        assert_eq!(best.raw_text, "set brightness to two");
    }

    #[test]
    fn unmatched_utterance_yields_empty_list() {
        let graph = graph_for("[SetColor]\nset light to (red | green | blue)");
        let recognitions = hark::recognize(&graph, "set light to purple").unwrap();
        assert!(recognitions.is_empty());
    }

    #[test]
    fn strict_retry_skips_stop_words() {
        let graph = graph_for("[SetColor]\nset light to (red | green | blue)");

        let without = hark::recognize_with_options(&graph, "set that light to red", &strict());
        assert!(without.unwrap().is_empty(), "strict pass should fail");

        let mut options = strict();
        options.stop_words.insert("that".to_string());
        let recognitions =
            hark::recognize_with_options(&graph, "set that light to red", &options).unwrap();
        assert_eq!(recognitions.len(), 1);
        assert_eq!(recognitions[0].intent.name, "SetColor");
        // Skipped tokens traverse no edge and are not part of the result.
        assert_eq!(recognitions[0].raw_text, "set light to red");
    }

    #[test]
    fn rules_resolve_across_intents() {
        let template = "[Intent2]\nrule = this is\n<rule> <Intent1.rule>\n\n[Intent1]\nrule = a test\n";
        let graph = graph_for(template);
        let recognitions = hark::recognize(&graph, "this is a test").unwrap();
        assert_eq!(recognitions.len(), 1);
        assert_eq!(recognitions[0].intent.name, "Intent2");
        assert_eq!(recognitions[0].intent.confidence, 1.0);
        assert_eq!(recognitions[0].text, "this is a test");
    }

    #[test]
    fn outgoing_weights_sum_to_one() {
        let graph = graph_for(
            "[A]\nturn on [the] (2 living room lamp | kitchen light){name}\nswitch it on\n\
             [B]\nset light to (2 red | 1 blue | green)\n",
        );
        for id in 0..graph.node_count() {
            let outgoing = graph.outgoing(hark::graph::NodeId(id as u32));
            if outgoing.is_empty() {
                continue;
            }
            let sum: f64 = outgoing.iter().map(|e| e.weight).sum();
            assert!(
                (sum - 1.0).abs() < 1e-9,
                "node {id} has outgoing weight sum {sum}"
            );
        }
    }

    #[test]
    fn weighted_branches_normalize() {
        let graph = graph_for("[B]\nset light to (2 red | 1 blue | green)");
        let mut found = false;
        for id in 0..graph.node_count() {
            let outgoing = graph.outgoing(hark::graph::NodeId(id as u32));
            if outgoing.len() == 3 {
                let mut weights: Vec<f64> = outgoing.iter().map(|e| e.weight).collect();
                weights.sort_by(f64::total_cmp);
                assert!((weights[0] - 0.25).abs() < 1e-9);
                assert!((weights[1] - 0.25).abs() < 1e-9);
                assert!((weights[2] - 0.5).abs() < 1e-9);
                found = true;
            }
        }
        assert!(found, "alternatives node not found");
        // The lower-weighted branch still matches exactly, so it keeps
        // full confidence.
        let recognitions =
            hark::recognize_with_options(&graph, "set light to blue", &strict()).unwrap();
        assert_eq!(recognitions[0].intent.confidence, 1.0);
    }

    #[test]
    fn every_template_sentence_matches_strictly() {
        let template = "[LightOn]\nlight = (living room lamp | kitchen light)\n\
                        turn on [the] <light>{name}\n\
                        [LightOff]\nturn off [the] <LightOn.light>{name}\n";
        let graph = graph_for(template);
        let sentences = [
            ("turn on living room lamp", "LightOn"),
            ("turn on the living room lamp", "LightOn"),
            ("turn on kitchen light", "LightOn"),
            ("turn on the kitchen light", "LightOn"),
            ("turn off living room lamp", "LightOff"),
            ("turn off the kitchen light", "LightOff"),
        ];
        for (sentence, intent) in sentences {
            let recognitions =
                hark::recognize_with_options(&graph, sentence, &strict()).unwrap();
            assert!(!recognitions.is_empty(), "no match for `{sentence}`");
            assert_eq!(recognitions[0].intent.name, intent);
            assert_eq!(
                recognitions[0].intent.confidence, 1.0,
                "confidence below 1.0 for `{sentence}`"
            );
        }
    }

    #[test]
    fn strict_match_is_a_zero_cost_fuzzy_match() {
        let template = "[LightOn]\nturn on [the] (living room lamp | kitchen light){name}";
        let graph = graph_for(template);
        for sentence in ["turn on the kitchen light", "turn on living room lamp"] {
            let strict_result =
                hark::recognize_with_options(&graph, sentence, &strict()).unwrap();
            let fuzzy_result = hark::recognize(&graph, sentence).unwrap();
            assert_eq!(strict_result[0].intent.name, fuzzy_result[0].intent.name);
            assert_eq!(strict_result[0].text, fuzzy_result[0].text);
            // Zero cost means full confidence after normalization.
            assert_eq!(fuzzy_result[0].intent.confidence, 1.0);
        }
    }

    #[test]
    fn expansion_is_idempotent() {
        let template = "[A]\ncolor = (red | green | blue)\nset [the] light to <color>\n\
                        paint $thing <color>\n";
        let grammar = Grammar::parse(template).unwrap();
        let mut slots = SlotValues::default();
        slots.insert(
            "thing".to_string(),
            vec![
                hark::parser::parse_sentence("the wall").unwrap(),
                hark::parser::parse_sentence("my house").unwrap(),
            ],
        );
        let once = hark::expand(&grammar, &slots, &Default::default()).unwrap();
        let twice = hark::expand(&once, &slots, &Default::default()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn nested_tags_stay_balanced() {
        let graph = graph_for("[A]\nshow ((red | green){color} light){what}");
        let recognitions = hark::recognize(&graph, "show red light").unwrap();
        let best = &recognitions[0];
        assert_eq!(best.entities.len(), 2);
        let color = best.entities.iter().find(|e| e.name == "color").unwrap();
        let what = best.entities.iter().find(|e| e.name == "what").unwrap();
        assert_eq!(color.value, Value::Str("red".to_string()));
        assert_eq!(what.value, Value::Str("red light".to_string()));
        assert_eq!(&best.text[color.start..color.end], "red");
        assert_eq!(&best.text[what.start..what.end], "red light");
    }

    #[test]
    fn slot_replacements_expand_into_alternatives() {
        let template = "[LightOn]\nturn on $light{name}";
        let grammar = Grammar::parse(template).unwrap();
        let mut slots = SlotValues::default();
        slots.insert(
            "light".to_string(),
            vec![
                hark::parser::parse_sentence("desk lamp").unwrap(),
                hark::parser::parse_sentence("ceiling light").unwrap(),
            ],
        );
        let grammar = hark::expand(&grammar, &slots, &Default::default()).unwrap();
        let graph = hark::compile(&grammar).unwrap();
        let recognitions = hark::recognize(&graph, "turn on desk lamp").unwrap();
        assert_eq!(recognitions[0].entities[0].value, Value::Str("desk lamp".to_string()));
    }

    #[test]
    fn missing_slot_matches_nothing_unless_strict() {
        let template = "[A]\nturn on $light\nhello there\n";
        let grammar = Grammar::parse(template).unwrap();

        let lenient = hark::expand(&grammar, &SlotValues::default(), &Default::default()).unwrap();
        let graph = hark::compile(&lenient).unwrap();
        assert!(hark::recognize(&graph, "turn on desk lamp").unwrap().is_empty());
        assert!(!hark::recognize(&graph, "hello there").unwrap().is_empty());

        let config = hark::ExpansionConfig {
            strict_slots: true,
            ..Default::default()
        };
        let err = hark::expand(&grammar, &SlotValues::default(), &config).unwrap_err();
        assert_eq!(
            err,
            ExpansionError::MissingSlot {
                name: "light".to_string()
            }
        );
    }

    #[test]
    fn recursive_rules_are_rejected() {
        let template = "[A]\nx = one <y>\ny = two <x>\nsay <x>\n";
        let grammar = Grammar::parse(template).unwrap();
        let err = hark::expand(&grammar, &Default::default(), &Default::default()).unwrap_err();
        assert!(
            matches!(err, ExpansionError::RecursiveRule { .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn missing_rules_are_rejected() {
        let template = "[A]\nsay <nope>\n";
        let grammar = Grammar::parse(template).unwrap();
        let err = hark::expand(&grammar, &Default::default(), &Default::default()).unwrap_err();
        assert_eq!(
            err,
            ExpansionError::MissingRule {
                intent: "A".to_string(),
                rule: "nope".to_string()
            }
        );
    }

    #[test]
    fn expansion_depth_is_bounded() {
        let template = "[A]\na = <b>\nb = hello\nsay <a>\n";
        let grammar = Grammar::parse(template).unwrap();
        let config = hark::ExpansionConfig {
            max_depth: 1,
            ..Default::default()
        };
        let err = hark::expand(&grammar, &Default::default(), &config).unwrap_err();
        assert!(
            matches!(err, ExpansionError::MaxDepthExceeded { max_depth: 1, .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn number_ranges_expand_with_int_converter() {
        let graph = graph_for("[SetLevel]\nset level to (1..5){level}");
        let recognitions = hark::recognize(&graph, "set level to 3").unwrap();
        let entity = &recognitions[0].entities[0];
        assert_eq!(entity.tokens, vec![Value::Int(3)]);
        assert_eq!(entity.value, Value::Int(3));

        let graph = graph_for("[SetLevel]\nset level to (0..100,20){level}");
        assert!(hark::recognize(&graph, "set level to 40").unwrap().len() == 1);
        assert!(hark::recognize(&graph, "set level to 30").unwrap().is_empty());
    }

    #[test]
    fn substitutions_rewrite_the_output_text() {
        let graph = graph_for("[Greet]\nhello:hi world:\n");
        let best = &hark::recognize(&graph, "hello world").unwrap()[0];
        assert_eq!(best.text, "hi");
        assert_eq!(best.raw_text, "hello world");

        let graph = graph_for("[Where]\nis it (in the house):(inside){place}\n");
        let best = &hark::recognize(&graph, "is it in the house").unwrap()[0];
        assert_eq!(best.text, "is it inside");
        assert_eq!(best.entities[0].value, Value::Str("inside".to_string()));
        assert_eq!(best.entities[0].raw_value, "in the house");
    }

    #[test]
    fn tag_substitutions_replace_the_entity_value() {
        let graph = graph_for("[SetColor]\nmake it (crimson | scarlet){color:red}\n");
        let best = &hark::recognize(&graph, "make it scarlet").unwrap()[0];
        assert_eq!(best.entities[0].value, Value::Str("red".to_string()));
        assert_eq!(best.entities[0].raw_value, "scarlet");
        assert_eq!(best.text, "make it red");
    }

    #[test]
    fn unknown_converters_fail_recognition() {
        let graph = graph_for("[A]\n(hello){greeting!nosuch}\n");
        let err = hark::recognize(&graph, "hello").unwrap_err();
        assert_eq!(err, RecognitionError::UnknownConverter("nosuch".to_string()));
    }

    #[test]
    fn failing_converters_drop_only_their_candidate() {
        let graph = graph_for("[A]\n(hello){v!int}\nhello world\n");
        // `int` cannot parse "hello": that candidate is dropped, no error.
        assert!(hark::recognize(&graph, "hello").unwrap().is_empty());
        assert_eq!(hark::recognize(&graph, "hello world").unwrap().len(), 1);
    }

    #[test]
    fn caller_converters_extend_the_table() {
        let graph = graph_for("[A]\n(hello){v!shout}\n");
        let mut options = RecognizeOptions::default();
        let mut extra = hark::ConverterTable::new();
        extra.insert("shout", |values| {
            Ok(values
                .iter()
                .map(|v| Value::Str(format!("{}!", v.to_string().to_uppercase())))
                .collect())
        });
        options.extra_converters = Some(extra);
        let best = &hark::recognize_with_options(&graph, "hello", &options).unwrap()[0];
        assert_eq!(best.entities[0].value, Value::Str("HELLO!".to_string()));
    }

    #[test]
    fn identical_recognitions_are_merged() {
        let graph = graph_for("[A]\nhello\nhello\n");
        let mut options = strict();
        options.config.max_recognitions = 0;
        let recognitions = hark::recognize_with_options(&graph, "hello", &options).unwrap();
        assert_eq!(recognitions.len(), 1);
    }

    #[test]
    fn max_recognitions_caps_results() {
        let graph = graph_for("[A]\nhello{a}\nhello{b}\n");
        let mut options = strict();
        options.config.max_recognitions = 0;
        assert_eq!(
            hark::recognize_with_options(&graph, "hello", &options)
                .unwrap()
                .len(),
            2
        );
        options.config.max_recognitions = 1;
        assert_eq!(
            hark::recognize_with_options(&graph, "hello", &options)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn intent_filters_restrict_parsing_and_matching() {
        let template = "[A]\nhello\n[B]\nhello\n";
        let mut filter = AHashSet::default();
        filter.insert("B".to_string());

        let options = hark::ParseOptions {
            intent_filter: Some(filter.clone()),
            ..Default::default()
        };
        let grammar = hark::parse(template, &options).unwrap();
        assert!(grammar.intent("A").is_none());
        assert!(grammar.intent("B").is_some());

        let graph = graph_for(template);
        let mut options = RecognizeOptions::default();
        options.config.max_recognitions = 0;
        options.intent_filter = Some(filter);
        let recognitions = hark::recognize_with_options(&graph, "hello", &options).unwrap();
        assert_eq!(recognitions.len(), 1);
        assert_eq!(recognitions[0].intent.name, "B");
    }

    #[test]
    fn sentence_transforms_apply_before_parsing() {
        let template = "[A]\nTURN ON THE LIGHT\n";
        let options = hark::ParseOptions {
            sentence_transform: Some(&hark::utils::fold_case),
            ..Default::default()
        };
        let grammar = hark::parse(template, &options).unwrap();
        let grammar = hark::expand(&grammar, &Default::default(), &Default::default()).unwrap();
        let graph = hark::compile(&grammar).unwrap();
        assert_eq!(hark::recognize(&graph, "turn on the light").unwrap().len(), 1);
    }

    #[test]
    fn comments_and_continuations_are_handled() {
        let template = "# a template\n[A]\nturn on \\\n  the light  ; trailing comment\n";
        let graph = graph_for(template);
        let best = &hark::recognize(&graph, "turn on the light").unwrap()[0];
        assert_eq!(best.text, "turn on the light");
    }

    #[test]
    fn duplicate_rules_take_the_last_definition() {
        let template = "[A]\nx = hello\nx = goodbye\nsay <x>\n";
        let graph = graph_for(template);
        assert!(hark::recognize(&graph, "say hello").unwrap().is_empty());
        assert_eq!(hark::recognize(&graph, "say goodbye").unwrap().len(), 1);
    }

    #[test]
    fn parse_errors_carry_line_and_column() {
        let err = Grammar::parse("[A]\nturn on (the light\n").unwrap_err();
        match err {
            ParseError::UnbalancedDelimiter {
                location,
                delimiter,
                ..
            } => {
                assert_eq!(delimiter, ')');
                assert_eq!(location.line, 2);
                assert_eq!(location.column, 10);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = Grammar::parse("[A]\nfoo\\qbar\n").unwrap_err();
        assert!(
            matches!(err, ParseError::UnknownEscape { escape: 'q', .. }),
            "unexpected error: {err:?}"
        );

        let err = Grammar::parse("[A]\n(a | )\n").unwrap_err();
        assert!(
            matches!(err, ParseError::EmptyAlternative { .. }),
            "unexpected error: {err:?}"
        );

        let err = Grammar::parse("hello\n[A]\nworld\n").unwrap_err();
        assert!(
            matches!(err, ParseError::SentenceOutsideSection { .. }),
            "unexpected error: {err:?}"
        );

        let err = Grammar::parse("[A]\nset level to 5..1\n").unwrap_err();
        assert!(
            matches!(err, ParseError::MalformedRange { .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn ngram_counts_cover_all_sentences() {
        let graph = graph_for("[A]\na b\na c\n");
        let counts = hark::ngram_counts(&graph, 2, Some("<s>"), Some("</s>"));
        let table = &counts["A"];
        let bigram = |a: &str, b: &str| vec![a.to_string(), b.to_string()];
        assert_eq!(table[&bigram("<s>", "a")], 2);
        assert_eq!(table[&bigram("a", "b")], 1);
        assert_eq!(table[&bigram("a", "c")], 1);
        assert_eq!(table[&bigram("b", "</s>")], 1);
        assert_eq!(table[&bigram("c", "</s>")], 1);
    }

    #[test]
    fn fst_serialization_follows_openfst_text_conventions() {
        let graph = graph_for("[A]\nturn on (one:1 | two:2){value}\n");
        let fst = hark::graph_to_fst(&graph);
        assert!(fst.input_symbols.starts_with("<eps> 0\n"));
        assert!(fst.output_symbols.starts_with("<eps> 0\n"));
        assert!(fst.input_symbols.contains("turn"));
        assert!(fst.output_symbols.contains("__begin__value"));

        let mut saw_final = false;
        for line in fst.fst.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.len() {
                5 => {
                    assert!(fields[4].parse::<f64>().unwrap() >= 0.0);
                }
                2 => saw_final = true,
                n => panic!("unexpected field count {n} in line `{line}`"),
            }
        }
        assert!(saw_final, "no final-state line emitted");
    }

    #[test]
    fn recognitions_serialize_to_json() {
        let graph = graph_for("[SetBrightness]\nset brightness to (one:1 | two:2){value!int}");
        let recognitions = hark::recognize(&graph, "set brightness to two").unwrap();
        let json = serde_json::to_value(&recognitions[0]).unwrap();
        assert_eq!(json["intent"]["name"], "SetBrightness");
        assert_eq!(json["entities"][0]["tokens"][0], 2);
        assert_eq!(json["entities"][0]["raw_tokens"][0], "two");
    }

    #[test]
    fn zero_deadline_returns_best_so_far() {
        let graph = graph_for("[A]\nhello\n");
        let mut options = RecognizeOptions::default();
        options.config.max_seconds = Some(0.0);
        let recognitions = hark::recognize_with_options(&graph, "hello", &options).unwrap();
        assert!(recognitions.is_empty());
    }

    #[test]
    fn tokenizer_splits_on_whitespace() {
        assert_eq!(
            hark::utils::tokenize("  turn   on\tthe light "),
            vec!["turn", "on", "the", "light"]
        );
        assert_eq!(
            hark::utils::normalize_whitespace("  turn   on\tthe light "),
            "turn on the light"
        );
    }
}
