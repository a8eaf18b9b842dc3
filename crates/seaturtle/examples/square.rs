use seaturtle::Recorder;

fn main() {
    let prog = seaturtle::parse(
        "sub square repeat 4 forward size right 90 end end set size 90 call square",
    )
    .unwrap();
    let mut recorder = Recorder::default();
    seaturtle::interpret(&mut recorder, &prog).unwrap();
    dbg!(recorder.events);
}
