use clap::{Arg, ArgAction, Command};
use color_eyre::eyre::{eyre, Result};
use rewrite_fst::{
    from_word_pair, load_bimachine, Bimachine, Fst, LogObserver, Pipeline, RewritePolicy, FA,
};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

/// Printable ASCII together with tab and newline
fn default_alphabet() -> HashSet<char> {
    (' '..='~').chain(['\t', '\n']).collect()
}

fn parse_policy(name: &str) -> Result<RewritePolicy> {
    if name.eq_ignore_ascii_case("obligatory") {
        Ok(RewritePolicy::Obligatory)
    } else if name.eq_ignore_ascii_case("optional") {
        Ok(RewritePolicy::Optional)
    } else if name.eq_ignore_ascii_case("lml") {
        Ok(RewritePolicy::LeftmostLongest)
    } else {
        Err(eyre!(
            "policy should be one of OBLIGATORY | OPTIONAL | LML, got {}",
            name
        ))
    }
}

fn read_lines(input: Option<&PathBuf>) -> Result<Vec<String>> {
    let lines = match input {
        Some(file_path) => {
            let file = File::open(file_path)?;
            BufReader::new(file).lines().collect::<io::Result<Vec<_>>>()?
        }
        None => io::stdin().lock().lines().collect::<io::Result<Vec<_>>>()?,
    };
    Ok(lines)
}

fn process_with_bimachine(bimachine: &Bimachine, lines: &[String]) {
    for line in lines {
        match bimachine.process(line) {
            Ok(output) => println!("{}", output),
            Err(error) => log::warn!("Skipping {:?}: {}", line, error),
        }
    }
}

fn process_with_transducer(transducer: &Fst, lines: &[String]) -> Result<()> {
    for line in lines {
        let outputs = transducer.process(line)?;
        if outputs.is_empty() {
            log::warn!("Skipping {:?}: no output", line);
        }
        for output in outputs {
            println!("{}", output);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Command::new("rewrite-fst")
                        .version("0.1")
                        .about("Compile literal rewrite rules into a transducer and a bimachine, then rewrite text with them")
                        .arg(
                            Arg::new("rule")
                                .short('r')
                                .long("rule")
                                .value_names(["FROM", "TO"])
                                .num_args(2)
                                .action(ArgAction::Append)
                                .value_parser(clap::value_parser!(String))
                                .help("Pair of a literal and its replacement. Repeat to add alternatives")
                        )
                        .arg(
                            Arg::new("alphabet")
                                .short('a')
                                .long("alphabet")
                                .value_name("SYMBOLS")
                                .value_parser(clap::value_parser!(String))
                                .help("Every symbol the input may contain. Defaults to printable ASCII with tab and newline")
                        )
                        .arg(
                            Arg::new("policy")
                                .short('p')
                                .long("policy")
                                .value_name("OBLIGATORY, OPTIONAL, LML")
                                .default_value("lml")
                                .value_parser(clap::value_parser!(String))
                                .help("How competing matches are resolved")
                        )
                        .arg(
                            Arg::new("input")
                                .short('i')
                                .long("input")
                                .value_name("INPUT FILE")
                                .value_parser(clap::value_parser!(PathBuf))
                                .help("File whose lines are rewritten. Standard input is read when absent")
                        )
                        .arg(
                            Arg::new("save-bimachine")
                                .short('s')
                                .long("save-bimachine")
                                .value_name("FILE")
                                .value_parser(clap::value_parser!(String))
                                .help("Save the compiled bimachine as json")
                        )
                        .arg(
                            Arg::new("load-bimachine")
                                .short('l')
                                .long("load-bimachine")
                                .value_name("FILE")
                                .value_parser(clap::value_parser!(String))
                                .conflicts_with("rule")
                                .help("Rewrite with a previously saved bimachine instead of compiling rules")
                        )
                        .arg(
                            Arg::new("save-dot")
                                .short('d')
                                .long("save-dot")
                                .value_name("PREFIX")
                                .value_parser(clap::value_parser!(String))
                                .help("Save the rewriter and the bimachine automata as Graphviz dot files")
                        )
                        .get_matches();

    let lines_input = args.get_one::<PathBuf>("input");
    let dot_prefix = args.get_one::<String>("save-dot");

    if let Some(file_name) = args.get_one::<String>("load-bimachine") {
        let bimachine = load_bimachine(file_name)?;
        if let Some(prefix) = dot_prefix {
            bimachine.get_left().save_dot(&format!("{}_left", prefix))?;
            bimachine.get_right().save_dot(&format!("{}_right", prefix))?;
        }
        let lines = read_lines(lines_input)?;
        process_with_bimachine(&bimachine, &lines);
        return Ok(());
    }

    let mut rule: Option<Fst> = None;
    if let Some(values) = args.get_occurrences::<String>("rule") {
        for value_group in values {
            let pair: Vec<_> = value_group.collect();
            let [from, to] = pair.as_slice() else {
                return Err(eyre!("Both the literal and its replacement should be provided"));
            };
            let next = from_word_pair(from, to);
            rule = Some(match rule {
                Some(rule) => rule.union(&next),
                None => next,
            });
        }
    }
    let rule = rule.ok_or_else(|| eyre!("Either rewrite rules or a saved bimachine should be provided!"))?;

    let alphabet: HashSet<char> = match args.get_one::<String>("alphabet") {
        Some(symbols) => symbols.chars().collect(),
        None => default_alphabet(),
    };

    let policy = match args.get_one::<String>("policy") {
        Some(name) => parse_policy(name)?,
        None => RewritePolicy::LeftmostLongest,
    };

    let observer = LogObserver;
    let pipeline = Pipeline::new(alphabet)
        .with_observer(&observer)
        .add_stage_with_policy("rules", rule, policy);
    let transducer = pipeline.compile_transducer();

    if let Some(prefix) = dot_prefix {
        transducer.save_dot(&format!("{}_rewriter", prefix))?;
    }

    if policy == RewritePolicy::Optional {
        let lines = read_lines(lines_input)?;
        return process_with_transducer(&transducer, &lines);
    }

    let bimachine = transducer.to_bimachine(pipeline.get_alphabet())?;
    log::info!(
        "Bimachine built with {} left and {} right states",
        bimachine.get_left().get_num_states(),
        bimachine.get_right().get_num_states()
    );

    if let Some(prefix) = dot_prefix {
        bimachine.get_left().save_dot(&format!("{}_left", prefix))?;
        bimachine.get_right().save_dot(&format!("{}_right", prefix))?;
    }

    if let Some(file_name) = args.get_one::<String>("save-bimachine") {
        bimachine.save_bimachine(file_name)?;
    }

    let lines = read_lines(lines_input)?;
    process_with_bimachine(&bimachine, &lines);

    Ok(())
}
